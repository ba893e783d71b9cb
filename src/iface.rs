// SPDX-License-Identifier: MIT

//! The interface-manager contract.
//!
//! The platform layer that watches kernel interfaces and runs DHCP
//! clients lives outside this crate. It drives the allocator through the
//! inherent methods of [`crate::pa::HncpPaHandle`] (`set_internal`,
//! `update_delegated_prefix`, `set_external_data`, `set_ipv4_uplink`,
//! `add_lease`) and receives the results through [`PaIfaceCallbacks`].

use std::net::Ipv6Addr;

use crate::ip::Prefix;
use crate::time::Time;

/// Calls the allocator makes back into the platform layer.
pub trait PaIfaceCallbacks {
    /// A prefix assignment for an internal link was applied or unapplied;
    /// the platform configures router advertisements accordingly.
    #[allow(clippy::too_many_arguments)]
    fn update_prefix(
        &mut self,
        ifname: &str,
        prefix: &Prefix,
        valid_until: Time,
        preferred_until: Time,
        dhcp_data: &[u8],
        applied: bool,
    );

    /// The router address on an internal link was applied or unapplied.
    fn update_address(
        &mut self,
        ifname: &str,
        address: &Ipv6Addr,
        applied: bool,
    );

    /// A delegated prefix entered or left the enabled set.
    fn update_dp(&mut self, prefix: &Prefix, removed: bool);

    /// Aggregated DHCPv6/DHCPv4 option blobs to serve downstream.
    fn update_dhcp_data(&mut self, dhcpv6: &[u8], dhcpv4: &[u8]);
}

/// Prefix delegation downstream of us: what a lease currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseUpdate {
    pub prefix: Prefix,
    pub valid_until: Time,
    pub preferred_until: Time,
}

/// Callback fired when a downstream lease gains, changes or (with
/// `None`) loses its prefix.
pub type LeaseCallback = Box<dyn FnMut(Option<LeaseUpdate>)>;
