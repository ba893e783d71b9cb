// SPDX-License-Identifier: MIT

//! Binds the assignment core to the flooded database and the interface
//! manager: mirrors remote assigned prefixes and delegated prefixes out
//! of the flood, publishes our own assignments back into it, handles ULA
//! and IPv4 spontaneous generation, downstream delegation leases, and
//! stable storage.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::net::Ipv6Addr;
use std::rc::Rc;

use log::{debug, info};
use rand::{Rng, RngCore};

use crate::core::{
    Event, Hncp, LocalEdits, Subscriber, SubscriberRef, CAPABILITIES,
};
use crate::iface::{LeaseCallback, LeaseUpdate, PaIfaceCallbacks};
use crate::ip::{ula_space, Prefix};
use crate::proto::{
    AssignedPrefixTlv, DelegatedPrefixTlv, ExternalConnectionTlv, HncpTlv,
    NeighbourTlv, NodeAddressTlv, NodeId, PrefixPolicyTlv, VersionTlv,
    HNCP_T_ASSIGNED_PREFIX, HNCP_T_EXTERNAL_CONNECTION, HNCP_T_NODE_ADDRESS,
    HNCP_T_PEER, HNCP_T_VERSION,
};
use crate::time::{local_abs_to_remote_rel, remote_rel_to_local_abs, tmin, Time};
use crate::tlv::{tlv_to_bytes, TlvBuffer};

use super::store::{PaStore, StoreCategory};
use super::{
    AdvPrefix, PaCore, PaCoreConfig, PaEvent, PaLinkId, RandomRule,
    ScarcityRule, StorageRule, PA_PRIORITY_EXCLUDE, PA_PRIORITY_FAKE,
};

/// Priority a plain node address competes at.
const ROUTER_ADDRESS_PA_PRIORITY: u8 = 3;

/// Delay before a removed remote delegated prefix is really dropped; a
/// flood update withdraws and re-adds records back to back.
const DP_DELAYED_DELETE: Time = 50;

/// Spontaneous-generation backoff: uniform in 10..=3010 ms.
const LOCAL_BACKOFF_MIN: Time = 10;
const LOCAL_BACKOFF_SPAN: Time = 3000;

/// Minimum prefix length handed to downstream delegation leases.
const PD_MIN_PLEN: u8 = 60;

/// Node id placeholder advps carry; compares above every real node so
/// equal-priority candidates always lose against them.
const FAKE_NODE_ID: NodeId = NodeId([0xff; 8]);

/// ULA and IPv4 generation policy, mirroring the defaults of the
/// original daemon.
#[derive(Debug, Clone)]
pub struct UlaConf {
    pub use_ula: bool,
    pub no_ula_if_glb_ipv6: bool,
    pub use_ipv4: bool,
    pub no_ipv4_unless_uplink: bool,
    pub use_random_ula: bool,
    /// Fixed ULA when random generation is disabled.
    pub ula_prefix: Option<Prefix>,
    pub ula_plen: u8,
    pub v4_prefix: Prefix,
    pub local_valid_lifetime: Time,
    pub local_preferred_lifetime: Time,
    /// Refresh local lifetimes this long before they expire.
    pub local_update_delay: Time,
}

impl Default for UlaConf {
    fn default() -> Self {
        UlaConf {
            use_ula: true,
            no_ula_if_glb_ipv6: false,
            use_ipv4: true,
            no_ipv4_unless_uplink: true,
            use_random_ula: true,
            ula_prefix: None,
            ula_plen: 48,
            v4_prefix: "10.0.0.0/8".parse().expect("v4 prefix"),
            local_valid_lifetime: 86_400_000,
            local_preferred_lifetime: 43_200_000,
            local_update_delay: 64_800_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DpSource {
    /// Learned from the interface manager on a local uplink.
    Iface { ifname: String },
    /// Learned from another node's external connection record.
    Hncp { node_id: NodeId },
    /// Spontaneously generated (ULA or IPv4).
    Local,
}

#[derive(Debug)]
struct HpaDp {
    prefix: Prefix,
    source: DpSource,
    valid_until: Time,
    preferred_until: Time,
    dhcp_data: Vec<u8>,
    excluded: Option<Prefix>,
    /// Destination policy a remote delegation carries (::/0 marks a
    /// default-route-capable uplink).
    dst: Option<Prefix>,
    enabled: bool,
    pa_dp: Option<super::PaDpId>,
    excluded_registered: bool,
    delete_at: Option<Time>,
}

#[derive(Debug, Default)]
struct HpaIface {
    internal: bool,
    ep_id: Option<u32>,
    pa_link: Option<PaLinkId>,
    aa_link: Option<PaLinkId>,
    extdata_v6: Vec<u8>,
    extdata_v4: Vec<u8>,
    ipv4_uplink: bool,
}

struct HpaLease {
    duid: Vec<u8>,
    pa_link: PaLinkId,
    callback: LeaseCallback,
    current: Option<LeaseUpdate>,
}

#[derive(Debug, Default)]
struct LocalDpState {
    enabled: bool,
    backoff_until: Option<Time>,
    dp_key: Option<usize>,
}

/// Registration of an applied link prefix with the address core.
struct AddrReg {
    aa_dp: super::PaDpId,
    fakes: [Prefix; 2],
}

/// Deferred write into the flooded database. Applied outside the inner
/// borrow, because the engine's change dispatch calls back into us.
enum TlvOp {
    Publish(Vec<u8>),
    Remove(Vec<u8>),
    Republish,
}

pub struct HncpPa {
    conf: UlaConf,
    own_id: NodeId,
    hw_seed: Vec<u8>,
    rng: Box<dyn RngCore>,

    pa: PaCore,
    aa: PaCore,
    store: Rc<RefCell<PaStore>>,

    ifaces: BTreeMap<String, HpaIface>,
    dps: BTreeMap<usize, HpaDp>,
    next_dp: usize,
    leases: BTreeMap<usize, HpaLease>,
    next_lease: usize,
    lease_links: BTreeMap<usize, usize>,

    ula: LocalDpState,
    v4: LocalDpState,
    ula_dirty: bool,
    v4_dirty: bool,
    enabled_dirty: bool,

    /// Capability words other nodes advertise; mismatches are ignored.
    node_caps: BTreeMap<NodeId, u32>,

    /// Flooded adjacency: (peer, peer endpoint) -> our endpoint, built
    /// from the neighbour records peers publish about us.
    adjacency: BTreeMap<(NodeId, u32), u32>,

    /// Our records currently in the flooded database, so withdrawal
    /// removes the exact bytes that were published.
    published: BTreeMap<(bool, usize, Prefix), Vec<u8>>,

    /// Published records whose owner disappeared outside a run; removed
    /// from the flooded database on the next run.
    stale_published: Vec<Vec<u8>>,

    /// Address-core registrations per applied link prefix.
    addr_regs: BTreeMap<(usize, Prefix), AddrReg>,

    if_cbs: Option<Box<dyn PaIfaceCallbacks>>,
    dhcp_dirty: bool,

    now: Time,
}

impl HncpPa {
    fn new(
        conf: UlaConf,
        own_id: NodeId,
        hw_seed: Vec<u8>,
        store: PaStore,
        rng: Box<dyn RngCore>,
    ) -> Self {
        let store = Rc::new(RefCell::new(store));
        let mut pa =
            PaCore::new("pa", PaCoreConfig::prefixes(), own_id);
        pa.add_rule(Box::new(StorageRule {
            store: store.clone(),
        }));
        pa.add_rule(Box::<RandomRule>::default());
        pa.add_rule(Box::<ScarcityRule>::default());
        let mut aa =
            PaCore::new("aa", PaCoreConfig::addresses(), own_id);
        aa.add_rule(Box::new(StorageRule {
            store: store.clone(),
        }));
        aa.add_rule(Box::<RandomRule>::default());
        HncpPa {
            conf,
            own_id,
            hw_seed,
            rng,
            pa,
            aa,
            store,
            ifaces: BTreeMap::new(),
            dps: BTreeMap::new(),
            next_dp: 0,
            leases: BTreeMap::new(),
            next_lease: 0,
            lease_links: BTreeMap::new(),
            ula: LocalDpState::default(),
            v4: LocalDpState::default(),
            ula_dirty: true,
            v4_dirty: true,
            enabled_dirty: false,
            node_caps: BTreeMap::new(),
            adjacency: BTreeMap::new(),
            published: BTreeMap::new(),
            stale_published: Vec::new(),
            addr_regs: BTreeMap::new(),
            if_cbs: None,
            dhcp_dirty: false,
            now: 0,
        }
    }

    fn link_seed(&self, name: &str) -> Vec<u8> {
        let mut seed = Vec::with_capacity(name.len() + 1 + self.hw_seed.len());
        seed.extend_from_slice(name.as_bytes());
        seed.push(b'-');
        seed.extend_from_slice(&self.hw_seed);
        seed
    }

    // ----- delegated prefix bookkeeping -----

    fn find_dp(
        &self,
        prefix: &Prefix,
        source: &DpSource,
    ) -> Option<usize> {
        self.dps
            .iter()
            .find(|(_, dp)| dp.prefix == *prefix && dp.source == *source)
            .map(|(k, _)| *k)
    }

    fn find_dp_by_prefix(&self, prefix: &Prefix) -> Option<&HpaDp> {
        self.dps
            .values()
            .filter(|dp| dp.prefix == *prefix)
            .find(|dp| dp.enabled)
            .or_else(|| {
                self.dps.values().find(|dp| dp.prefix == *prefix)
            })
    }

    fn insert_dp(&mut self, dp: HpaDp) -> usize {
        let key = self.next_dp;
        self.next_dp += 1;
        info!("delegated prefix {} from {:?}", dp.prefix, dp.source);
        self.dps.insert(key, dp);
        self.enabled_dirty = true;
        self.ula_dirty = true;
        self.v4_dirty = true;
        key
    }

    fn drop_dp(&mut self, key: usize) {
        if let Some(mut dp) = self.dps.remove(&key) {
            info!("delegated prefix {} gone", dp.prefix);
            self.disable_dp(&mut dp);
        }
        self.enabled_dirty = true;
        self.ula_dirty = true;
        self.v4_dirty = true;
    }

    fn disable_dp(&mut self, dp: &mut HpaDp) {
        if let Some(id) = dp.pa_dp.take() {
            self.pa.remove_dp(id);
        }
        if dp.excluded_registered {
            if let Some(excluded) = &dp.excluded {
                self.pa.remove_advp(excluded, &FAKE_NODE_ID, 0);
                if let Some(tlv) = self
                    .published
                    .remove(&(false, usize::MAX, *excluded))
                {
                    self.stale_published.push(tlv);
                }
            }
            dp.excluded_registered = false;
        }
        if dp.enabled {
            dp.enabled = false;
            if let Some(cbs) = self.if_cbs.as_mut() {
                cbs.update_dp(&dp.prefix, true);
            }
        }
        self.dhcp_dirty = true;
    }

    /// Precedence rule deciding which delegated prefixes feed the
    /// allocator: containment by another prefix disables, identical
    /// prefixes prefer the flooded copy, two flooded copies disable
    /// both until the originators sort it out.
    fn dp_should_enable(&self, key: usize) -> bool {
        let dp = &self.dps[&key];
        if dp.source == DpSource::Local {
            return true;
        }
        let mut passed = false;
        for (k2, dp2) in &self.dps {
            if *k2 == key {
                passed = true;
                continue;
            }
            if dp2.prefix == dp.prefix {
                let ours = !matches!(dp.source, DpSource::Hncp { .. });
                let theirs_hncp = matches!(dp2.source, DpSource::Hncp { .. });
                if ours {
                    if !theirs_hncp {
                        if passed {
                            return false;
                        }
                    } else {
                        return false;
                    }
                } else if theirs_hncp {
                    return false;
                }
            } else if dp2.prefix.contains(&dp.prefix) {
                return false;
            }
        }
        true
    }

    fn update_enabled_dps(&mut self, ops: &mut Vec<TlvOp>) {
        self.enabled_dirty = false;
        let keys: Vec<usize> = self.dps.keys().cloned().collect();
        for key in keys {
            let should = self.dp_should_enable(key);
            let dp = self.dps.get_mut(&key).expect("dp");
            if should == dp.enabled {
                continue;
            }
            if should {
                dp.enabled = true;
                let prefix = dp.prefix;
                let excluded = dp.excluded;
                debug!("delegated prefix {prefix} enabled");
                let pa_dp = self.pa.add_dp(prefix);
                let dp = self.dps.get_mut(&key).expect("dp");
                dp.pa_dp = Some(pa_dp);
                if let Some(excluded) = excluded {
                    // Carve-outs block locally and are claimed on the
                    // wire at the top priority, so no other node ever
                    // assigns inside them either.
                    self.pa.add_advp(AdvPrefix {
                        prefix: excluded,
                        priority: PA_PRIORITY_EXCLUDE,
                        node_id: FAKE_NODE_ID,
                        ep_id: 0,
                        link: None,
                        fake: true,
                    });
                    self.dps.get_mut(&key).expect("dp").excluded_registered =
                        true;
                    let tlv = tlv_to_bytes(&HncpTlv::AssignedPrefix(
                        AssignedPrefixTlv {
                            ep_id: 0,
                            priority: PA_PRIORITY_EXCLUDE,
                            prefix: excluded,
                        },
                    ));
                    ops.push(TlvOp::Publish(tlv.clone()));
                    self.published
                        .insert((false, usize::MAX, excluded), tlv);
                }
                if let Some(cbs) = self.if_cbs.as_mut() {
                    cbs.update_dp(&prefix, false);
                }
                self.dhcp_dirty = true;
            } else {
                let mut dp = self.dps.remove(&key).expect("dp");
                debug!("delegated prefix {} disabled", dp.prefix);
                self.disable_dp(&mut dp);
                self.dps.insert(key, dp);
            }
        }
    }

    // ----- ULA / IPv4 spontaneous generation -----

    fn has_other_ula(&self) -> bool {
        self.dps.values().any(|dp| {
            dp.source != DpSource::Local && dp.prefix.is_ula()
        })
    }

    fn has_global_v6(&self) -> bool {
        self.dps.values().any(|dp| dp.prefix.is_global())
    }

    fn has_better_v4(&self, uplink: bool) -> bool {
        self.dps.values().any(|dp| {
            let DpSource::Hncp { node_id } = &dp.source else {
                return false;
            };
            dp.prefix.is_ipv4()
                && (!uplink
                    || (matches!(&dp.dst, Some(d) if d.plen() == 0)
                        && *node_id >= self.own_id))
        })
    }

    fn elect_v4_iface(&self) -> Option<String> {
        if self.v4.enabled {
            if let Some(key) = self.v4.dp_key {
                if let Some(HpaDp {
                    source: DpSource::Iface { ifname },
                    ..
                }) = self.dps.get(&key)
                {
                    if self
                        .ifaces
                        .get(ifname)
                        .map(|i| i.ipv4_uplink)
                        .unwrap_or(false)
                    {
                        return Some(ifname.clone());
                    }
                }
            }
        }
        self.ifaces
            .iter()
            .find(|(_, i)| i.ipv4_uplink)
            .map(|(name, _)| name.clone())
    }

    fn make_local_dp(&mut self, prefix: Prefix, source: DpSource) -> usize {
        let valid = self.now + self.conf.local_valid_lifetime;
        let preferred = self.now + self.conf.local_preferred_lifetime;
        self.insert_dp(HpaDp {
            prefix,
            source,
            valid_until: valid,
            preferred_until: preferred,
            dhcp_data: Vec::new(),
            excluded: None,
            dst: None,
            enabled: false,
            pa_dp: None,
            excluded_registered: false,
            delete_at: None,
        })
    }

    fn local_backoff(&mut self) -> Time {
        self.now
            + LOCAL_BACKOFF_MIN
            + self.rng.gen_range(0..=LOCAL_BACKOFF_SPAN)
    }

    fn pick_ula(&mut self) -> Prefix {
        if !self.conf.use_random_ula {
            if let Some(fixed) = self.conf.ula_prefix {
                return fixed;
            }
        }
        if let Some(cached) = self.store.borrow().ula() {
            debug!("re-using cached ULA {cached}");
            return cached;
        }
        // fdxx: 40 random global-id bits below fd00::/8.
        let mut octets = ula_space().addr().octets();
        octets[0] = 0xfd;
        let mut random = [0u8; 5];
        self.rng.fill_bytes(&mut random);
        octets[1..6].copy_from_slice(&random);
        let ula = Prefix::new(
            Ipv6Addr::from(octets),
            self.conf.ula_plen,
        );
        info!("generated new ULA {ula}");
        ula
    }

    fn ula_update(&mut self, ops: &mut Vec<TlvOp>) {
        self.ula_dirty = false;
        let destroy = !self.conf.use_ula
            || self.has_other_ula()
            || (self.conf.no_ula_if_glb_ipv6 && self.has_global_v6());
        if destroy {
            if self.ula.enabled {
                info!("withdrawing spontaneous ULA");
                self.ula.enabled = false;
                if let Some(key) = self.ula.dp_key.take() {
                    self.drop_dp(key);
                }
                ops.push(TlvOp::Republish);
            }
            self.ula.backoff_until = None;
        } else if self.ula.enabled {
            self.refresh_local_dp(self.ula.dp_key, ops);
        } else if self.ula.backoff_until.is_none() {
            let at = self.local_backoff();
            debug!("ULA generation backoff until {at}");
            self.ula.backoff_until = Some(at);
        } else if matches!(self.ula.backoff_until, Some(at) if self.now >= at)
        {
            self.ula.backoff_until = None;
            let ula = self.pick_ula();
            let now = self.now;
            self.store.borrow_mut().set_ula(now, ula);
            let key = self.make_local_dp(ula, DpSource::Local);
            self.ula.dp_key = Some(key);
            self.ula.enabled = true;
            ops.push(TlvOp::Republish);
        }
    }

    fn v4_update(&mut self, ops: &mut Vec<TlvOp>) {
        self.v4_dirty = false;
        let elected = self.elect_v4_iface();
        let impossible = !self.conf.use_ipv4
            || (elected.is_none()
                && (self.conf.no_ipv4_unless_uplink
                    || self.has_better_v4(false)))
            || self.has_better_v4(true);
        if impossible {
            if self.v4.enabled {
                info!("withdrawing IPv4 delegation");
                self.v4.enabled = false;
                if let Some(key) = self.v4.dp_key.take() {
                    self.drop_dp(key);
                }
                ops.push(TlvOp::Republish);
            }
            self.v4.backoff_until = None;
        } else if self.v4.enabled {
            // Re-elect the uplink if it moved.
            if let Some(key) = self.v4.dp_key {
                let wanted = match &elected {
                    Some(ifname) => DpSource::Iface {
                        ifname: ifname.clone(),
                    },
                    None => DpSource::Local,
                };
                let current = self.dps.get(&key).map(|d| d.source.clone());
                if current.as_ref() != Some(&wanted) {
                    info!("IPv4 uplink moved to {elected:?}");
                    if let Some(dp) = self.dps.get_mut(&key) {
                        dp.source = wanted;
                    }
                    self.enabled_dirty = true;
                    ops.push(TlvOp::Republish);
                }
            }
            self.refresh_local_dp(self.v4.dp_key, ops);
        } else if elected.is_none() && self.v4.backoff_until.is_none() {
            self.v4.backoff_until = Some(self.local_backoff());
        } else if elected.is_some()
            || matches!(self.v4.backoff_until, Some(at) if self.now >= at)
        {
            self.v4.backoff_until = None;
            let source = match elected {
                Some(ifname) => {
                    info!("IPv4 uplink is {ifname}");
                    DpSource::Iface { ifname }
                }
                None => {
                    info!("IPv4 spontaneous generation");
                    DpSource::Local
                }
            };
            let prefix = self.conf.v4_prefix;
            let key = self.make_local_dp(prefix, source);
            self.v4.dp_key = Some(key);
            self.v4.enabled = true;
            ops.push(TlvOp::Republish);
        }
    }

    fn refresh_local_dp(&mut self, key: Option<usize>, ops: &mut Vec<TlvOp>) {
        let Some(key) = key else { return };
        let (valid, preferred) = (
            self.now + self.conf.local_valid_lifetime,
            self.now + self.conf.local_preferred_lifetime,
        );
        let update_delay = self.conf.local_update_delay;
        if let Some(dp) = self.dps.get_mut(&key) {
            if dp.valid_until - update_delay <= self.now {
                debug!("refreshing local delegation {}", dp.prefix);
                dp.valid_until = valid;
                dp.preferred_until = preferred;
                ops.push(TlvOp::Republish);
            }
        }
    }

    fn local_dp_next_run(&self) -> Option<Time> {
        let mut deadline = tmin(
            self.ula.backoff_until,
            self.v4.backoff_until,
        );
        for state in [&self.ula, &self.v4] {
            if let Some(key) = state.dp_key {
                if let Some(dp) = self.dps.get(&key) {
                    deadline = tmin(
                        deadline,
                        Some(dp.valid_until - self.conf.local_update_delay),
                    );
                }
            }
        }
        deadline
    }

    // ----- flooded database mirror -----

    fn node_usable(&self, node: &NodeId) -> bool {
        self.node_caps.get(node) == Some(&CAPABILITIES)
    }

    fn remote_tlv(
        &mut self,
        node: &NodeId,
        origination: Time,
        tlv: &[u8],
        add: bool,
    ) {
        if *node == self.own_id {
            return;
        }
        let Ok(buf) = TlvBuffer::new_checked(tlv) else {
            return;
        };
        match buf.kind() {
            HNCP_T_VERSION => {
                if add {
                    if let Ok(v) = VersionTlv::parse_value(buf.value()) {
                        self.node_caps.insert(*node, v.capabilities);
                    }
                } else {
                    self.node_caps.remove(node);
                }
            }
            HNCP_T_PEER => {
                if let Ok(peer) = NeighbourTlv::parse_value(buf.value()) {
                    self.remote_peer_claim(node, &peer, add);
                }
            }
            HNCP_T_ASSIGNED_PREFIX => {
                if add && !self.node_usable(node) {
                    return;
                }
                let Ok(ap) = AssignedPrefixTlv::parse_value(buf.value())
                else {
                    return;
                };
                if add {
                    let link = self.adjacent_pa_link(node, ap.ep_id);
                    self.pa.add_advp(AdvPrefix {
                        prefix: ap.prefix,
                        priority: ap.priority,
                        node_id: *node,
                        ep_id: ap.ep_id,
                        link,
                        fake: false,
                    });
                } else {
                    self.pa.remove_advp(&ap.prefix, node, ap.ep_id);
                }
            }
            HNCP_T_NODE_ADDRESS => {
                if add && !self.node_usable(node) {
                    return;
                }
                let Ok(na) = NodeAddressTlv::parse_value(buf.value()) else {
                    return;
                };
                let prefix = Prefix::new(na.address, 128);
                if add {
                    self.aa.add_advp(AdvPrefix {
                        prefix,
                        priority: ROUTER_ADDRESS_PA_PRIORITY,
                        node_id: *node,
                        ep_id: na.ep_id,
                        link: None,
                        fake: false,
                    });
                } else {
                    self.aa.remove_advp(&prefix, node, na.ep_id);
                }
            }
            HNCP_T_EXTERNAL_CONNECTION => {
                if add && !self.node_usable(node) {
                    return;
                }
                let Ok(ec) =
                    ExternalConnectionTlv::parse_value(buf.value())
                else {
                    return;
                };
                for dp in ec.delegated_prefixes() {
                    self.remote_dp(node, origination, dp, add);
                }
            }
            _ => {}
        }
    }

    fn remote_dp(
        &mut self,
        node: &NodeId,
        origination: Time,
        dp: &DelegatedPrefixTlv,
        add: bool,
    ) {
        let source = DpSource::Hncp { node_id: *node };
        let valid = remote_rel_to_local_abs(origination, dp.ms_valid);
        let preferred =
            remote_rel_to_local_abs(origination, dp.ms_preferred);
        let existing = self.find_dp(&dp.prefix, &source);
        if !add {
            // Delayed: a republish usually withdraws and re-adds.
            if let Some(key) = existing {
                let entry = self.dps.get_mut(&key).expect("dp");
                if entry.delete_at.is_none() {
                    entry.delete_at = Some(self.now + DP_DELAYED_DELETE);
                }
            }
            return;
        }
        let dhcp = dp.dhcpv6_data().unwrap_or(&[]).to_vec();
        let dst = dp.destination().copied();
        match existing {
            Some(key) => {
                let entry = self.dps.get_mut(&key).expect("dp");
                entry.delete_at = None;
                entry.valid_until = valid;
                entry.preferred_until = preferred;
                if entry.dhcp_data != dhcp {
                    entry.dhcp_data = dhcp;
                    self.dhcp_dirty = true;
                }
                if entry.dst != dst {
                    entry.dst = dst;
                    self.ula_dirty = true;
                    self.v4_dirty = true;
                }
            }
            None => {
                self.insert_dp(HpaDp {
                    prefix: dp.prefix,
                    source,
                    valid_until: valid,
                    preferred_until: preferred,
                    dhcp_data: dhcp,
                    excluded: None,
                    dst,
                    enabled: false,
                    pa_dp: None,
                    excluded_registered: false,
                    delete_at: None,
                });
            }
        }
    }

    /// Which internal link (if any) a remote endpoint is adjacent on.
    ///
    /// Deliberately resolved from the *flooded* adjacency (the peers'
    /// published neighbour records), not the live neighbour table: a
    /// crashed router's assignments must stay bound to their link for
    /// the whole pruning grace period, so the survivors keep using its
    /// prefix and adopt it instead of generating a new one.
    fn adjacent_pa_link(
        &self,
        node: &NodeId,
        ep_id: u32,
    ) -> Option<PaLinkId> {
        let our_ep = self.adjacency.get(&(*node, ep_id)).copied()?;
        self.ifaces
            .values()
            .find(|iface| iface.ep_id == Some(our_ep))
            .and_then(|iface| iface.pa_link)
    }

    /// Maintain the flooded-adjacency map from one peer's neighbour
    /// record about us.
    fn remote_peer_claim(
        &mut self,
        node: &NodeId,
        peer: &NeighbourTlv,
        add: bool,
    ) {
        if peer.neighbour_node_id != self.own_id {
            return;
        }
        if add {
            self.adjacency
                .insert((*node, peer.local_ep_id), peer.neighbour_ep_id);
        } else {
            self.adjacency.remove(&(*node, peer.local_ep_id));
        }
        self.rebind_advps();
    }

    fn rebind_advps(&mut self) {
        let resolve: BTreeMap<(NodeId, u32), PaLinkId> = self
            .adjacency
            .iter()
            .filter_map(|((node, their_ep), our_ep)| {
                self.ifaces
                    .values()
                    .find(|iface| iface.ep_id == Some(*our_ep))
                    .and_then(|iface| iface.pa_link)
                    .map(|link| ((*node, *their_ep), link))
            })
            .collect();
        self.pa.rebind_advp_links(|node, ep| {
            resolve.get(&(*node, ep)).copied()
        });
    }

    // ----- external connection publishing -----

    fn dp_tlv(&self, dp: &HpaDp) -> HncpTlv {
        let mut sub = Vec::new();
        if !dp.dhcp_data.is_empty() {
            sub.push(HncpTlv::Dhcpv6Data(dp.dhcp_data.clone()));
        }
        // Default-route destination policy; refined policies come from
        // the platform layer eventually.
        sub.push(HncpTlv::PrefixPolicy(PrefixPolicyTlv::Destination(
            Prefix::new(Ipv6Addr::UNSPECIFIED, 0),
        )));
        HncpTlv::DelegatedPrefix(DelegatedPrefixTlv {
            ms_valid: local_abs_to_remote_rel(self.now, dp.valid_until),
            ms_preferred: local_abs_to_remote_rel(
                self.now,
                dp.preferred_until,
            ),
            prefix: dp.prefix,
            sub_tlvs: sub,
        })
    }

    /// Recompose our external connection records; called just before
    /// every republish so relative lifetimes stay current.
    fn refresh_ec(&mut self, edits: &mut LocalEdits) {
        edits.remove_tlvs_by_type(HNCP_T_EXTERNAL_CONNECTION);
        // One record per uplink interface carrying all its enabled
        // delegations plus the uplink DHCP blobs.
        let mut ifnames: Vec<&String> = self
            .dps
            .values()
            .filter_map(|dp| match (&dp.source, dp.enabled) {
                (DpSource::Iface { ifname }, true) => Some(ifname),
                _ => None,
            })
            .collect();
        ifnames.sort();
        ifnames.dedup();
        for ifname in ifnames {
            let mut tlvs: Vec<HncpTlv> = self
                .dps
                .values()
                .filter(|dp| {
                    dp.enabled
                        && matches!(&dp.source, DpSource::Iface { ifname: i }
                            if i == ifname)
                })
                .map(|dp| self.dp_tlv(dp))
                .collect();
            if let Some(iface) = self.ifaces.get(ifname) {
                if !iface.extdata_v6.is_empty() {
                    tlvs.push(HncpTlv::Dhcpv6Data(iface.extdata_v6.clone()));
                }
                if !iface.extdata_v4.is_empty() {
                    tlvs.push(HncpTlv::Dhcpv4Data(iface.extdata_v4.clone()));
                }
            }
            edits.publish_tlv(&HncpTlv::ExternalConnection(
                ExternalConnectionTlv { tlvs },
            ));
        }
        // Spontaneous delegations get a record each.
        for state in [&self.ula, &self.v4] {
            if !state.enabled {
                continue;
            }
            let Some(dp) =
                state.dp_key.and_then(|key| self.dps.get(&key))
            else {
                continue;
            };
            if !dp.enabled || dp.source != DpSource::Local {
                continue;
            }
            edits.publish_tlv(&HncpTlv::ExternalConnection(
                ExternalConnectionTlv {
                    tlvs: vec![self.dp_tlv(dp)],
                },
            ));
        }
    }

    // ----- assignment event plumbing -----

    fn iface_by_pa_link(&self, link: PaLinkId) -> Option<&String> {
        self.ifaces
            .iter()
            .find(|(_, i)| i.pa_link == Some(link))
            .map(|(name, _)| name)
    }

    fn iface_by_aa_link(&self, link: PaLinkId) -> Option<&String> {
        self.ifaces
            .iter()
            .find(|(_, i)| i.aa_link == Some(link))
            .map(|(name, _)| name)
    }

    fn lease_by_link(&self, link: PaLinkId) -> Option<usize> {
        self.lease_links.get(&link.0).copied()
    }

    fn handle_pa_event(&mut self, ops: &mut Vec<TlvOp>, event: PaEvent) {
        match event {
            PaEvent::Published {
                link,
                prefix,
                priority,
            } => {
                let ep_id = self
                    .iface_by_pa_link(link)
                    .and_then(|name| self.ifaces[name].ep_id)
                    .unwrap_or(0);
                let tlv = tlv_to_bytes(&HncpTlv::AssignedPrefix(
                    AssignedPrefixTlv {
                        ep_id,
                        priority,
                        prefix,
                    },
                ));
                ops.push(TlvOp::Publish(tlv.clone()));
                self.published.insert((false, link.0, prefix), tlv);
            }
            PaEvent::Unpublished { link, prefix } => {
                if let Some(tlv) =
                    self.published.remove(&(false, link.0, prefix))
                {
                    ops.push(TlvOp::Remove(tlv));
                }
            }
            PaEvent::Applied {
                link,
                dp_prefix,
                prefix,
            } => {
                let now = self.now;
                if let Some(ifname) = self.iface_by_pa_link(link).cloned() {
                    let (valid, preferred, dhcp) = self
                        .find_dp_by_prefix(&dp_prefix)
                        .map(|dp| {
                            (
                                dp.valid_until,
                                dp.preferred_until,
                                dp.dhcp_data.clone(),
                            )
                        })
                        .unwrap_or((now, now, Vec::new()));
                    if let Some(cbs) = self.if_cbs.as_mut() {
                        cbs.update_prefix(
                            &ifname, &prefix, valid, preferred, &dhcp, true,
                        );
                    }
                    self.store.borrow_mut().cache(
                        now,
                        StoreCategory::Prefix,
                        &ifname,
                        prefix,
                    );
                    // The applied link prefix becomes the address pool
                    // for that link.
                    if let Some(iface) = self.ifaces.get(&ifname) {
                        if iface.aa_link.is_some() {
                            let aa_dp = self.aa.add_dp(prefix);
                            let fakes = [
                                Prefix::new(prefix.addr(), 128),
                                Prefix::new(prefix.highest_addr(), 128),
                            ];
                            for fake in &fakes {
                                self.aa.add_advp(AdvPrefix {
                                    prefix: *fake,
                                    priority: PA_PRIORITY_FAKE,
                                    node_id: FAKE_NODE_ID,
                                    ep_id: 0,
                                    link: None,
                                    fake: true,
                                });
                            }
                            self.addr_regs
                                .insert((link.0, prefix), AddrReg { aa_dp, fakes });
                        }
                    }
                } else if let Some(lease_id) = self.lease_by_link(link) {
                    let (valid, preferred) = self
                        .find_dp_by_prefix(&dp_prefix)
                        .map(|dp| (dp.valid_until, dp.preferred_until))
                        .unwrap_or((now, now));
                    let update = LeaseUpdate {
                        prefix,
                        valid_until: valid,
                        preferred_until: preferred,
                    };
                    if let Some(lease) = self.leases.get_mut(&lease_id) {
                        if lease.current != Some(update) {
                            lease.current = Some(update);
                            (lease.callback)(Some(update));
                        }
                    }
                }
            }
            PaEvent::Unapplied { link, prefix } => {
                let now = self.now;
                if let Some(ifname) = self.iface_by_pa_link(link).cloned() {
                    if let Some(cbs) = self.if_cbs.as_mut() {
                        cbs.update_prefix(
                            &ifname, &prefix, now, now, &[], false,
                        );
                    }
                    if let Some(reg) = self.addr_regs.remove(&(link.0, prefix)) {
                        self.aa.remove_dp(reg.aa_dp);
                        for fake in &reg.fakes {
                            self.aa.remove_advp(fake, &FAKE_NODE_ID, 0);
                        }
                    }
                } else if let Some(lease_id) = self.lease_by_link(link) {
                    if let Some(lease) = self.leases.get_mut(&lease_id) {
                        lease.current = None;
                        (lease.callback)(None);
                    }
                }
            }
            PaEvent::Assigned { .. } | PaEvent::Unassigned { .. } => {}
        }
    }

    fn handle_aa_event(&mut self, ops: &mut Vec<TlvOp>, event: PaEvent) {
        match event {
            PaEvent::Published { link, prefix, .. } => {
                let ep_id = self
                    .iface_by_aa_link(link)
                    .and_then(|name| self.ifaces[name].ep_id)
                    .unwrap_or(0);
                let tlv = tlv_to_bytes(&HncpTlv::NodeAddress(
                    NodeAddressTlv {
                        ep_id,
                        address: prefix.addr(),
                    },
                ));
                ops.push(TlvOp::Publish(tlv.clone()));
                self.published.insert((true, link.0, prefix), tlv);
            }
            PaEvent::Unpublished { link, prefix } => {
                if let Some(tlv) =
                    self.published.remove(&(true, link.0, prefix))
                {
                    ops.push(TlvOp::Remove(tlv));
                }
            }
            PaEvent::Applied { link, prefix, .. } => {
                let now = self.now;
                if let Some(ifname) = self.iface_by_aa_link(link).cloned() {
                    if let Some(cbs) = self.if_cbs.as_mut() {
                        cbs.update_address(&ifname, &prefix.addr(), true);
                    }
                    self.store.borrow_mut().cache(
                        now,
                        StoreCategory::Address,
                        &ifname,
                        prefix,
                    );
                }
            }
            PaEvent::Unapplied { link, prefix } => {
                if let Some(ifname) = self.iface_by_aa_link(link).cloned() {
                    if let Some(cbs) = self.if_cbs.as_mut() {
                        cbs.update_address(&ifname, &prefix.addr(), false);
                    }
                }
            }
            PaEvent::Assigned { .. } | PaEvent::Unassigned { .. } => {}
        }
    }

    fn refresh_dhcp_data(&mut self) {
        self.dhcp_dirty = false;
        let mut v6 = Vec::new();
        let mut v4 = Vec::new();
        for (name, iface) in &self.ifaces {
            let has_uplink = self.dps.values().any(|dp| {
                dp.enabled
                    && matches!(&dp.source, DpSource::Iface { ifname }
                        if ifname == name)
            });
            if has_uplink {
                v6.extend_from_slice(&iface.extdata_v6);
                v4.extend_from_slice(&iface.extdata_v4);
            }
        }
        for dp in self.dps.values() {
            if dp.enabled
                && matches!(dp.source, DpSource::Hncp { .. })
                && !dp.dhcp_data.is_empty()
            {
                v6.extend_from_slice(&dp.dhcp_data);
            }
        }
        if let Some(cbs) = self.if_cbs.as_mut() {
            cbs.update_dhcp_data(&v6, &v4);
        }
    }
}

impl Subscriber for HncpPa {
    fn notify(&mut self, event: &Event, edits: &mut LocalEdits) {
        match event {
            Event::TlvAdded {
                node,
                origination,
                tlv,
            } => self.remote_tlv(node, *origination, tlv, true),
            Event::TlvRemoved {
                node,
                origination,
                tlv,
            } => self.remote_tlv(node, *origination, tlv, false),
            Event::NodeRemoved { id } => {
                self.pa.remove_advps_from(id);
                self.aa.remove_advps_from(id);
                self.node_caps.remove(id);
                self.adjacency.retain(|(node, _), _| node != id);
                let stale: Vec<usize> = self
                    .dps
                    .iter()
                    .filter(|(_, dp)| {
                        matches!(&dp.source, DpSource::Hncp { node_id }
                            if node_id == id)
                    })
                    .map(|(k, _)| *k)
                    .collect();
                for key in stale {
                    let entry = self.dps.get_mut(&key).expect("dp");
                    if entry.delete_at.is_none() {
                        entry.delete_at =
                            Some(self.now + DP_DELAYED_DELETE);
                    }
                }
            }
            Event::AboutToRepublish => self.refresh_ec(edits),
            Event::EndpointChanged {
                ifname,
                ep_id,
                enabled,
            } => {
                let iface = self.ifaces.entry(ifname.clone()).or_default();
                iface.ep_id = if *enabled { Some(*ep_id) } else { None };
                self.rebind_advps();
            }
            Event::OwnIdChanged { new, .. } => {
                self.own_id = *new;
                self.pa.set_own_id(*new);
                self.aa.set_own_id(*new);
                // Peers still describe the old identifier; the map
                // refills as they republish.
                self.adjacency.clear();
                self.rebind_advps();
                self.ula_dirty = true;
                self.v4_dirty = true;
            }
            Event::NodeAdded { .. }
            | Event::NeighbourAdded { .. }
            | Event::NeighbourRemoved { .. }
            | Event::LocalTlvAdded { .. }
            | Event::LocalTlvRemoved { .. } => {}
        }
    }
}

/// Owner handle for the glue: subscribes the inner state to the engine
/// and forwards interface-manager calls.
pub struct HncpPaHandle {
    inner: Rc<RefCell<HncpPa>>,
}

impl HncpPaHandle {
    pub fn new(
        hncp: &mut Hncp,
        conf: UlaConf,
        store: PaStore,
        rng: Box<dyn RngCore>,
    ) -> Self {
        let inner = Rc::new(RefCell::new(HncpPa::new(
            conf,
            hncp.own_node_id(),
            hncp.hw_seed().to_vec(),
            store,
            rng,
        )));
        let sub: SubscriberRef = inner.clone();
        hncp.subscribe(sub);
        HncpPaHandle { inner }
    }

    pub fn set_callbacks(&self, cbs: Box<dyn PaIfaceCallbacks>) {
        self.inner.borrow_mut().if_cbs = Some(cbs);
    }

    /// An interface became (or stopped being) an enabled internal link.
    pub fn set_internal(
        &self,
        hncp: &mut Hncp,
        ifname: &str,
        enabled: bool,
    ) {
        if enabled {
            hncp.enable_link(ifname);
        } else {
            hncp.disable_link(ifname);
        }
        let mut guard = self.inner.borrow_mut();
        let pa = &mut *guard;
        let seed = pa.link_seed(ifname);
        let iface = pa.ifaces.entry(ifname.to_string()).or_default();
        if enabled && !iface.internal {
            iface.internal = true;
            let link = pa.pa.add_link(ifname, seed.clone(), None, None);
            let aa_link = pa.aa.add_link(ifname, seed, None, None);
            let iface = pa.ifaces.get_mut(ifname).expect("iface");
            iface.pa_link = Some(link);
            iface.aa_link = Some(aa_link);
        } else if !enabled && iface.internal {
            iface.internal = false;
            let (pa_link, aa_link) = (iface.pa_link.take(), iface.aa_link.take());
            if let Some(link) = pa_link {
                pa.pa.remove_link(link);
            }
            if let Some(link) = aa_link {
                pa.aa.remove_link(link);
            }
        }
    }

    /// Delegated prefix learned (or lost) on a local uplink.
    #[allow(clippy::too_many_arguments)]
    pub fn update_delegated_prefix(
        &self,
        ifname: &str,
        prefix: &Prefix,
        excluded: Option<&Prefix>,
        valid_until: Time,
        preferred_until: Time,
        dhcp_data: &[u8],
    ) {
        let mut guard = self.inner.borrow_mut();
        let pa = &mut *guard;
        let source = DpSource::Iface {
            ifname: ifname.to_string(),
        };
        let existing = pa.find_dp(prefix, &source);
        let alive = valid_until > pa.now;
        match (existing, alive) {
            (Some(key), false) => pa.drop_dp(key),
            (Some(key), true) => {
                let dp = pa.dps.get_mut(&key).expect("dp");
                dp.valid_until = valid_until;
                dp.preferred_until = preferred_until;
                if dp.dhcp_data != dhcp_data {
                    dp.dhcp_data = dhcp_data.to_vec();
                    pa.dhcp_dirty = true;
                }
                let dp = pa.dps.get_mut(&key).expect("dp");
                if dp.excluded.as_ref() != excluded {
                    // Changing the carve-out means re-registering the
                    // placeholder, easiest done over a disable cycle.
                    dp.excluded = excluded.copied();
                    pa.enabled_dirty = true;
                }
            }
            (None, true) => {
                pa.insert_dp(HpaDp {
                    prefix: *prefix,
                    source,
                    valid_until,
                    preferred_until,
                    dhcp_data: dhcp_data.to_vec(),
                    excluded: excluded.copied(),
                    dst: None,
                    enabled: false,
                    pa_dp: None,
                    excluded_registered: false,
                    delete_at: None,
                });
            }
            (None, false) => {}
        }
    }

    pub fn set_external_data(
        &self,
        ifname: &str,
        dhcpv6: &[u8],
        dhcpv4: &[u8],
    ) {
        let mut guard = self.inner.borrow_mut();
        let pa = &mut *guard;
        let iface = pa.ifaces.entry(ifname.to_string()).or_default();
        if iface.extdata_v6 != dhcpv6 || iface.extdata_v4 != dhcpv4 {
            iface.extdata_v6 = dhcpv6.to_vec();
            iface.extdata_v4 = dhcpv4.to_vec();
            pa.dhcp_dirty = true;
        }
    }

    /// Install an operator-configured prefix rule (static prefix,
    /// link-id bit field, ...).
    pub fn add_prefix_rule(&self, rule: Box<dyn super::PaRule>) {
        self.inner.borrow_mut().pa.add_rule(rule);
    }

    /// Install an operator-configured address rule.
    pub fn add_address_rule(&self, rule: Box<dyn super::PaRule>) {
        self.inner.borrow_mut().aa.add_rule(rule);
    }

    /// Override the desired assignment lengths for one link.
    pub fn set_link_plen(
        &self,
        ifname: &str,
        ip6_plen: Option<u8>,
        ip4_plen: Option<u8>,
    ) {
        let mut guard = self.inner.borrow_mut();
        let pa = &mut *guard;
        let Some(iface) = pa.ifaces.get(ifname) else {
            return;
        };
        for (core, link) in
            [(&mut pa.pa, iface.pa_link), (&mut pa.aa, iface.aa_link)]
        {
            if let Some(link) = link {
                core.set_link_plens(link, ip4_plen, ip6_plen);
            }
        }
    }

    pub fn set_ipv4_uplink(&self, ifname: &str, uplink: bool) {
        let mut guard = self.inner.borrow_mut();
        let pa = &mut *guard;
        let iface = pa.ifaces.entry(ifname.to_string()).or_default();
        if iface.ipv4_uplink != uplink {
            iface.ipv4_uplink = uplink;
            pa.v4_dirty = true;
        }
    }

    /// Register a downstream delegation lease; PA treats it as a virtual
    /// link and the callback fires when a prefix lands on it.
    pub fn add_lease(
        &self,
        duid: &[u8],
        hint_len: u8,
        callback: LeaseCallback,
    ) -> usize {
        let mut guard = self.inner.borrow_mut();
        let pa = &mut *guard;
        let id = pa.next_lease;
        pa.next_lease += 1;
        let name = format!("lease-{}", hex(duid));
        let seed = pa.link_seed(&name);
        let plen = hint_len.clamp(PD_MIN_PLEN, 96);
        let link = pa.pa.add_link(&name, seed, None, Some(plen));
        pa.pa.set_link_v6_only(link, true);
        pa.lease_links.insert(link.0, id);
        pa.leases.insert(
            id,
            HpaLease {
                duid: duid.to_vec(),
                pa_link: link,
                callback,
                current: None,
            },
        );
        info!("downstream lease {} registered (hint /{hint_len})", hex(duid));
        id
    }

    pub fn del_lease(&self, id: usize) {
        let mut guard = self.inner.borrow_mut();
        let pa = &mut *guard;
        if let Some(lease) = pa.leases.remove(&id) {
            pa.lease_links.remove(&lease.pa_link.0);
            pa.pa.remove_link(lease.pa_link);
            debug!("downstream lease {} removed", hex(&lease.duid));
        }
    }

    /// Drive the allocator: delayed deletions, spontaneous generation,
    /// the delegated-prefix precedence rule, both assignment cores, and
    /// stable storage.
    ///
    /// Flooded-database writes are collected first and applied to the
    /// engine only once the inner state is released again: applying them
    /// re-enters subscriber dispatch, which includes ourselves.
    pub fn run(&self, now: Time, hncp: &mut Hncp) {
        let mut ops = Vec::new();
        {
            let mut guard = self.inner.borrow_mut();
            let pa = &mut *guard;
            pa.now = pa.now.max(now);

            // Delayed remote-dp deletions.
            let expired: Vec<usize> = pa
                .dps
                .iter()
                .filter(|(_, dp)| {
                    matches!(dp.delete_at, Some(at) if pa.now >= at)
                })
                .map(|(k, _)| *k)
                .collect();
            for key in expired {
                pa.drop_dp(key);
            }

            if pa.ula_dirty {
                pa.ula_update(&mut ops);
            }
            if pa.v4_dirty {
                pa.v4_update(&mut ops);
            }
            // Backoff expiry needs re-examination even without new input.
            if matches!(pa.ula.backoff_until, Some(at) if pa.now >= at) {
                pa.ula_update(&mut ops);
            }
            if matches!(pa.v4.backoff_until, Some(at) if pa.now >= at) {
                pa.v4_update(&mut ops);
            }
            pa.refresh_local_dp(pa.ula.dp_key, &mut ops);
            pa.refresh_local_dp(pa.v4.dp_key, &mut ops);

            if pa.enabled_dirty {
                pa.update_enabled_dps(&mut ops);
                ops.push(TlvOp::Republish);
            }

            let pa_events = pa.pa.run(pa.now);
            for event in pa_events {
                pa.handle_pa_event(&mut ops, event);
            }
            let aa_events = pa.aa.run(pa.now);
            for event in aa_events {
                pa.handle_aa_event(&mut ops, event);
            }

            if pa.dhcp_dirty {
                pa.refresh_dhcp_data();
            }
            for tlv in pa.stale_published.drain(..) {
                ops.push(TlvOp::Remove(tlv));
            }
            let now = pa.now;
            pa.store.borrow_mut().run(now);
        }
        for op in ops {
            match op {
                TlvOp::Publish(tlv) => hncp.publish_tlv_bytes(tlv),
                TlvOp::Remove(tlv) => hncp.remove_tlv_bytes(&tlv),
                TlvOp::Republish => hncp.force_republish(),
            }
        }
    }

    /// Earliest instant `run` needs to be called again.
    pub fn next_run(&self) -> Option<Time> {
        let pa = self.inner.borrow();
        let mut deadline = tmin(pa.pa.next_run(), pa.aa.next_run());
        deadline = tmin(deadline, pa.store.borrow().next_run());
        deadline = tmin(deadline, pa.local_dp_next_run());
        for dp in pa.dps.values() {
            deadline = tmin(deadline, dp.delete_at);
        }
        if pa.ula_dirty
            || pa.v4_dirty
            || pa.enabled_dirty
            || pa.dhcp_dirty
            || !pa.stale_published.is_empty()
        {
            deadline = tmin(deadline, Some(pa.now));
        }
        deadline
    }

    /// Flush stable storage (shutdown path).
    pub fn flush_storage(&self) {
        self.inner.borrow().store.borrow_mut().flush();
    }

    /// Current assignments of the prefix core (tests, CLI mirrors).
    pub fn with_state<R>(&self, f: impl FnOnce(&PaCore, &PaCore) -> R) -> R {
        let pa = self.inner.borrow();
        f(&pa.pa, &pa.aa)
    }
}

fn hex(data: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(data.len() * 2);
    for b in data {
        let _ = write!(out, "{b:02x}");
    }
    out
}
