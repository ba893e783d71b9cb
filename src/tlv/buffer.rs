// SPDX-License-Identifier: MIT

use byteorder::{BigEndian, ByteOrder};
use netlink_packet_utils::DecodeError;

use super::{tlv_align, TLV_HEADER_LEN};

const KIND: std::ops::Range<usize> = 0..2;
const LENGTH: std::ops::Range<usize> = 2..4;

/// A view over one encoded record.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct TlvBuffer<T> {
    buffer: T,
}

impl<T: AsRef<[u8]>> TlvBuffer<T> {
    pub fn new(buffer: T) -> Self {
        TlvBuffer { buffer }
    }

    pub fn new_checked(buffer: T) -> Result<Self, DecodeError> {
        let buf = Self::new(buffer);
        buf.check_buffer_length()?;
        Ok(buf)
    }

    pub fn check_buffer_length(&self) -> Result<(), DecodeError> {
        let len = self.buffer.as_ref().len();
        if len < TLV_HEADER_LEN {
            return Err(DecodeError::from(format!(
                "buffer has only {len} bytes, a record header is \
                {TLV_HEADER_LEN} bytes"
            )));
        }
        if len < TLV_HEADER_LEN + usize::from(self.length()) {
            return Err(DecodeError::from(format!(
                "record length {} runs past the end of the buffer \
                ({len} bytes)",
                self.length(),
            )));
        }
        Ok(())
    }

    pub fn into_inner(self) -> T {
        self.buffer
    }

    pub fn inner(&self) -> &T {
        &self.buffer
    }

    pub fn kind(&self) -> u16 {
        BigEndian::read_u16(&self.buffer.as_ref()[KIND])
    }

    pub fn length(&self) -> u16 {
        BigEndian::read_u16(&self.buffer.as_ref()[LENGTH])
    }

    /// Encoded size of this record including header and padding, capped at
    /// the end of the underlying buffer (the final record of a datagram
    /// may be transmitted without its padding).
    pub fn padded_length(&self) -> usize {
        tlv_align(TLV_HEADER_LEN + usize::from(self.length()))
            .min(self.buffer.as_ref().len())
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> TlvBuffer<&'a T> {
    /// The record value, padding excluded.
    pub fn value(&self) -> &'a [u8] {
        &self.buffer.as_ref()[TLV_HEADER_LEN..TLV_HEADER_LEN + usize::from(self.length())]
    }

    /// Iterate over aligned sub-records nested inside the value.
    pub fn nested(&self) -> TlvsIterator<&'a [u8]> {
        TlvsIterator::new(self.value())
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> TlvBuffer<T> {
    pub fn inner_mut(&mut self) -> &mut [u8] {
        self.buffer.as_mut()
    }

    pub fn set_kind(&mut self, kind: u16) {
        BigEndian::write_u16(&mut self.buffer.as_mut()[KIND], kind)
    }

    pub fn set_length(&mut self, length: u16) {
        BigEndian::write_u16(&mut self.buffer.as_mut()[LENGTH], length)
    }

    pub fn value_mut(&mut self) -> &mut [u8] {
        let length = usize::from(self.length());
        &mut self.buffer.as_mut()[TLV_HEADER_LEN..TLV_HEADER_LEN + length]
    }
}

/// Iterator over the records of a buffer. Yields an error (and then stops)
/// as soon as a record header or length is inconsistent, so callers can
/// drop the whole datagram.
#[derive(Debug, Clone)]
pub struct TlvsIterator<T> {
    position: usize,
    buffer: T,
}

impl<T> TlvsIterator<T> {
    pub fn new(buffer: T) -> Self {
        TlvsIterator {
            position: 0,
            buffer,
        }
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized + 'a> Iterator for TlvsIterator<&'a T> {
    type Item = Result<TlvBuffer<&'a [u8]>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let buffer = self.buffer.as_ref();
        if self.position >= buffer.len() {
            return None;
        }
        match TlvBuffer::new_checked(&buffer[self.position..]) {
            Ok(tlv) => {
                self.position += tlv.padded_length().max(TLV_HEADER_LEN);
                Some(Ok(tlv))
            }
            Err(e) => {
                // Stop after the first malformed record.
                self.position = buffer.len();
                Some(Err(e))
            }
        }
    }
}
