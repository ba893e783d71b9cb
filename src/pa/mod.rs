// SPDX-License-Identifier: MIT

//! The prefix/address assignment core.
//!
//! A rule-driven allocator: given delegated prefixes, the set of prefixes
//! other nodes advertise, and the local links, it maintains at most one
//! assignment per (link, delegated prefix) pair such that no two
//! assignments of equal priority overlap anywhere in the network.
//!
//! The same machine runs twice in a full router: once for per-link
//! prefixes and once, in address mode, for the single /128 each link gets
//! out of its assigned prefix.

mod hncp;
mod rules;
pub mod store;

pub use self::hncp::{HncpPa, HncpPaHandle, UlaConf};
pub use self::rules::{
    AddressRule, LinkIdRule, PaRule, Proposal, RandomRule, RuleCtx,
    ScarcityRule, StaticRule, StorageRule,
};

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};

use crate::ip::Prefix;
use crate::proto::NodeId;
use crate::time::{tmin, Time};

/// Published assignment priorities (the 0..=15 wire nibble).
pub const PA_PRIORITY_PD: u8 = 1;
pub const PA_PRIORITY_ADOPT: u8 = 2;
pub const PA_PRIORITY_CREATE: u8 = 2;
pub const PA_PRIORITY_STORE: u8 = 2;
pub const PA_PRIORITY_FAKE: u8 = 2;
pub const PA_PRIORITY_SCARCITY: u8 = 3;
pub const PA_PRIORITY_LINK_ID: u8 = 3;
pub const PA_PRIORITY_STATIC: u8 = 4;
pub const PA_PRIORITY_EXCLUDE: u8 = 15;

/// Internal rule precedence; higher values are consulted first.
pub const PA_RULE_STATIC: u32 = 100;
pub const PA_RULE_LINK_ID: u32 = 50;
pub const PA_RULE_ADDRESS: u32 = 50;
pub const PA_RULE_ADOPT: u32 = 30;
pub const PA_RULE_STORE: u32 = 25;
pub const PA_RULE_CREATE: u32 = 20;
pub const PA_RULE_SCARCITY: u32 = 10;

pub const PA_ADOPT_DELAY: Time = 200;
pub const PA_BACKOFF_DELAY: Time = 1000;
pub const PA_FLOOD_DELAY: Time = 1000;
pub const AA_ADOPT_DELAY: Time = 0;
pub const AA_FLOOD_DELAY: Time = 300;

pub const PA_RAND_TENTATIVES: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PaLinkId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PaDpId(pub(crate) usize);

/// Core behaviour knobs; address mode narrows candidates to /128s out of
/// the first quarter of the delegated space.
#[derive(Debug, Clone)]
pub struct PaCoreConfig {
    pub adopt_delay: Time,
    pub backoff_delay: Time,
    pub flood_delay: Time,
    pub address_mode: bool,
}

impl PaCoreConfig {
    pub fn prefixes() -> Self {
        PaCoreConfig {
            adopt_delay: PA_ADOPT_DELAY,
            backoff_delay: PA_BACKOFF_DELAY,
            flood_delay: PA_FLOOD_DELAY,
            address_mode: false,
        }
    }

    pub fn addresses() -> Self {
        PaCoreConfig {
            adopt_delay: AA_ADOPT_DELAY,
            backoff_delay: PA_BACKOFF_DELAY,
            flood_delay: AA_FLOOD_DELAY,
            address_mode: true,
        }
    }
}

/// One link assignments can land on. Lease links are the virtual links
/// downstream prefix delegation hands out of.
#[derive(Debug)]
pub struct PaLink {
    pub name: String,
    /// Deterministic seed for pseudo-random candidates.
    pub seed: Vec<u8>,
    pub ip4_plen: Option<u8>,
    pub ip6_plen: Option<u8>,
    /// IPv4-mapped delegations never land here (delegation leases).
    pub v6_only: bool,
}

/// A prefix somebody else (or a fake placeholder) has claimed.
#[derive(Debug, Clone)]
pub struct AdvPrefix {
    pub prefix: Prefix,
    pub priority: u8,
    pub node_id: NodeId,
    pub ep_id: u32,
    /// The local link this advertiser is adjacent on, when known.
    pub link: Option<PaLinkId>,
    /// Placeholders (exclusions, reserved addresses) that take part in
    /// collision checks but can never be adopted.
    pub fake: bool,
}

/// The binding of one (link, delegated prefix) pair.
#[derive(Debug)]
pub struct Ldp {
    pub link: PaLinkId,
    pub dp: PaDpId,
    pub assigned: Option<Prefix>,
    pub published: bool,
    pub priority: u8,
    pub rule_priority: u32,
    pub applied: bool,
    adopting: bool,
    backoff_until: Option<Time>,
    apply_at: Option<Time>,
}

impl Ldp {
    fn new(link: PaLinkId, dp: PaDpId) -> Self {
        Ldp {
            link,
            dp,
            assigned: None,
            published: false,
            priority: 0,
            rule_priority: 0,
            applied: false,
            adopting: false,
            backoff_until: None,
            apply_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaEvent {
    Assigned {
        link: PaLinkId,
        dp_prefix: Prefix,
        prefix: Prefix,
    },
    Unassigned {
        link: PaLinkId,
        prefix: Prefix,
    },
    Published {
        link: PaLinkId,
        prefix: Prefix,
        priority: u8,
    },
    Unpublished {
        link: PaLinkId,
        prefix: Prefix,
    },
    Applied {
        link: PaLinkId,
        dp_prefix: Prefix,
        prefix: Prefix,
    },
    Unapplied {
        link: PaLinkId,
        prefix: Prefix,
    },
}

/// `(priority, node id)` ordering used everywhere a winner must be picked.
fn beats(p1: u8, n1: &NodeId, p2: u8, n2: &NodeId) -> bool {
    p1 > p2 || (p1 == p2 && n1 > n2)
}

pub struct PaCore {
    label: &'static str,
    cfg: PaCoreConfig,
    own_id: NodeId,
    links: BTreeMap<usize, PaLink>,
    dps: BTreeMap<usize, Prefix>,
    advps: Vec<AdvPrefix>,
    ldps: BTreeMap<(usize, usize), Ldp>,
    rules: Vec<Box<dyn PaRule>>,
    dirty: BTreeSet<(usize, usize)>,
    next_link: usize,
    next_dp: usize,
    events: Vec<PaEvent>,
    now: Time,
}

impl PaCore {
    pub fn new(label: &'static str, cfg: PaCoreConfig, own_id: NodeId) -> Self {
        PaCore {
            label,
            cfg,
            own_id,
            links: BTreeMap::new(),
            dps: BTreeMap::new(),
            advps: Vec::new(),
            ldps: BTreeMap::new(),
            rules: Vec::new(),
            dirty: BTreeSet::new(),
            next_link: 0,
            next_dp: 0,
            events: Vec::new(),
            now: 0,
        }
    }

    pub fn set_own_id(&mut self, id: NodeId) {
        self.own_id = id;
        self.mark_all_dirty();
    }

    pub fn add_rule(&mut self, rule: Box<dyn PaRule>) {
        self.rules.push(rule);
        self.rules.sort_by(|a, b| {
            b.rule_priority().cmp(&a.rule_priority())
        });
        self.mark_all_dirty();
    }

    pub fn remove_rules(&mut self, name: &str) {
        self.rules.retain(|r| r.name() != name);
        self.mark_all_dirty();
    }

    pub fn add_link(
        &mut self,
        name: &str,
        seed: Vec<u8>,
        ip4_plen: Option<u8>,
        ip6_plen: Option<u8>,
    ) -> PaLinkId {
        let id = self.next_link;
        self.next_link += 1;
        self.links.insert(
            id,
            PaLink {
                name: name.to_string(),
                seed,
                ip4_plen,
                ip6_plen,
                v6_only: false,
            },
        );
        for dp in self.dps.keys() {
            self.ldps
                .insert((id, *dp), Ldp::new(PaLinkId(id), PaDpId(*dp)));
            self.dirty.insert((id, *dp));
        }
        debug!("{}: link {name} added", self.label);
        PaLinkId(id)
    }

    pub fn set_link_v6_only(&mut self, link: PaLinkId, v6_only: bool) {
        if let Some(l) = self.links.get_mut(&link.0) {
            l.v6_only = v6_only;
        }
        self.mark_all_dirty();
    }

    pub fn set_link_plens(
        &mut self,
        link: PaLinkId,
        ip4_plen: Option<u8>,
        ip6_plen: Option<u8>,
    ) {
        if let Some(l) = self.links.get_mut(&link.0) {
            l.ip4_plen = ip4_plen;
            l.ip6_plen = ip6_plen;
        }
        self.mark_all_dirty();
    }

    pub fn remove_link(&mut self, link: PaLinkId) {
        let keys: Vec<(usize, usize)> = self
            .ldps
            .keys()
            .filter(|(l, _)| *l == link.0)
            .cloned()
            .collect();
        for key in keys {
            self.teardown_ldp(key);
        }
        self.links.remove(&link.0);
    }

    pub fn link_name(&self, link: PaLinkId) -> Option<&str> {
        self.links.get(&link.0).map(|l| l.name.as_str())
    }

    pub fn add_dp(&mut self, prefix: Prefix) -> PaDpId {
        let id = self.next_dp;
        self.next_dp += 1;
        self.dps.insert(id, prefix);
        for link in self.links.keys() {
            self.ldps
                .insert((*link, id), Ldp::new(PaLinkId(*link), PaDpId(id)));
            self.dirty.insert((*link, id));
        }
        info!("{}: delegated prefix {prefix} in use", self.label);
        PaDpId(id)
    }

    pub fn remove_dp(&mut self, dp: PaDpId) {
        let keys: Vec<(usize, usize)> = self
            .ldps
            .keys()
            .filter(|(_, d)| *d == dp.0)
            .cloned()
            .collect();
        for key in keys {
            self.teardown_ldp(key);
        }
        if let Some(prefix) = self.dps.remove(&dp.0) {
            info!("{}: delegated prefix {prefix} withdrawn", self.label);
        }
    }

    pub fn dp_prefix(&self, dp: PaDpId) -> Option<Prefix> {
        self.dps.get(&dp.0).copied()
    }

    pub fn add_advp(&mut self, advp: AdvPrefix) {
        debug!(
            "{}: advertised prefix {} prio {} from {}",
            self.label, advp.prefix, advp.priority, advp.node_id
        );
        self.advps.push(advp);
        self.mark_all_dirty();
    }

    pub fn remove_advp(
        &mut self,
        prefix: &Prefix,
        node_id: &NodeId,
        ep_id: u32,
    ) {
        let before = self.advps.len();
        self.advps.retain(|a| {
            !(a.prefix == *prefix
                && a.node_id == *node_id
                && a.ep_id == ep_id)
        });
        if self.advps.len() != before {
            self.mark_all_dirty();
        }
    }

    pub fn remove_advps_from(&mut self, node_id: &NodeId) {
        let before = self.advps.len();
        self.advps.retain(|a| a.node_id != *node_id || a.fake);
        if self.advps.len() != before {
            self.mark_all_dirty();
        }
    }

    /// Re-resolve which local link each advertiser sits on, after the
    /// neighbour sets changed.
    pub fn rebind_advp_links(
        &mut self,
        resolve: impl Fn(&NodeId, u32) -> Option<PaLinkId>,
    ) {
        let mut changed = false;
        for advp in self.advps.iter_mut() {
            if advp.fake {
                continue;
            }
            let link = resolve(&advp.node_id, advp.ep_id);
            if advp.link != link {
                advp.link = link;
                changed = true;
            }
        }
        if changed {
            self.mark_all_dirty();
        }
    }

    pub fn assignments(&self) -> impl Iterator<Item = &Ldp> {
        self.ldps.values()
    }

    pub fn advps(&self) -> impl Iterator<Item = &AdvPrefix> {
        self.advps.iter()
    }

    fn mark_all_dirty(&mut self) {
        let keys: Vec<_> = self.ldps.keys().cloned().collect();
        self.dirty.extend(keys);
    }

    fn teardown_ldp(&mut self, key: (usize, usize)) {
        if let Some(ldp) = self.ldps.remove(&key) {
            let link = PaLinkId(key.0);
            if let Some(prefix) = ldp.assigned {
                if ldp.applied {
                    self.events.push(PaEvent::Unapplied { link, prefix });
                }
                if ldp.published {
                    self.events.push(PaEvent::Unpublished { link, prefix });
                }
                self.events.push(PaEvent::Unassigned { link, prefix });
            }
        }
        self.dirty.remove(&key);
    }

    /// Desired assignment length for `dp` on `link`.
    fn desired_plen(&self, link: &PaLink, dp: &Prefix) -> u8 {
        if self.cfg.address_mode {
            return 128;
        }
        if dp.is_ipv4() {
            if let Some(plen) = link.ip4_plen {
                return plen;
            }
            match dp.plen() {
                0..=112 => 120,
                113..=120 => 124,
                plen => plen,
            }
        } else {
            if let Some(plen) = link.ip6_plen {
                return plen;
            }
            match dp.plen() {
                0..=64 => 64,
                65..=80 => 80,
                plen => plen,
            }
        }
    }

    /// Space random candidates are drawn from: the whole delegated
    /// prefix, or its first quarter in address mode.
    fn candidate_space(&self, dp: &Prefix) -> Prefix {
        if self.cfg.address_mode && dp.plen() < 126 {
            Prefix::new(dp.addr(), dp.plen() + 2)
        } else {
            *dp
        }
    }

    /// Strongest competitor overlapping `candidate`, looking at both
    /// advertised prefixes and our own other assignments.
    fn strongest_conflict(
        &self,
        candidate: &Prefix,
        exclude: (usize, usize),
    ) -> Option<(u8, NodeId)> {
        let mut strongest: Option<(u8, NodeId)> = None;
        let mut consider = |priority: u8, node_id: NodeId| {
            let stronger = match &strongest {
                None => true,
                Some((p, n)) => beats(priority, &node_id, *p, n),
            };
            if stronger {
                strongest = Some((priority, node_id));
            }
        };
        for advp in &self.advps {
            if advp.prefix.overlaps(candidate) {
                consider(advp.priority, advp.node_id);
            }
        }
        for (key, ldp) in &self.ldps {
            if *key == exclude {
                continue;
            }
            if let Some(assigned) = &ldp.assigned {
                if ldp.published && assigned.overlaps(candidate) {
                    consider(ldp.priority, self.own_id);
                }
            }
        }
        strongest
    }

    /// Can `candidate` be claimed at `priority` by us?
    fn takeable(
        &self,
        candidate: &Prefix,
        priority: u8,
        exclude: (usize, usize),
    ) -> bool {
        match self.strongest_conflict(candidate, exclude) {
            None => true,
            Some((p, n)) => beats(priority, &self.own_id, p, &n),
        }
    }

    /// The strongest prefix advertised *on* this link inside `dp`, which
    /// the link should accept instead of making up its own.
    fn best_on_link(
        &self,
        link: PaLinkId,
        dp: &Prefix,
    ) -> Option<&AdvPrefix> {
        let mut best: Option<&AdvPrefix> = None;
        for advp in &self.advps {
            if advp.fake || advp.link != Some(link) {
                continue;
            }
            if !dp.contains(&advp.prefix) {
                continue;
            }
            let better = match best {
                None => true,
                Some(b) => beats(
                    advp.priority,
                    &advp.node_id,
                    b.priority,
                    &b.node_id,
                ),
            };
            if better {
                best = Some(advp);
            }
        }
        best
    }

    // ----- the per-ldp routine -----

    fn routine(&mut self, key: (usize, usize)) {
        let Some(ldp) = self.ldps.get(&key) else { return };
        let Some(dp) = self.dps.get(&key.1).copied() else {
            return;
        };
        if dp.is_ipv4()
            && self.links.get(&key.0).map(|l| l.v6_only).unwrap_or(false)
        {
            if ldp.assigned.is_some() {
                self.unassign(key);
            }
            return;
        }
        let link_id = PaLinkId(key.0);
        let now = self.now;

        // 1. A stronger advertisement on the link wins; use it and shut
        //    up (or keep ours if we are the strongest).
        let best = self
            .best_on_link(link_id, &dp)
            .map(|a| (a.prefix, a.priority, a.node_id));
        if let Some((b_prefix, b_priority, b_node)) = best {
            let ours_wins = ldp.published
                && ldp.assigned.is_some()
                && beats(
                    ldp.priority,
                    &self.own_id,
                    b_priority,
                    &b_node,
                );
            if !ours_wins {
                self.accept_remote(key, dp, b_prefix, b_priority);
                return;
            }
        }

        let ldp = self.ldps.get(&key).expect("ldp");
        // 2. A published assignment stays unless somebody stronger
        //    overlaps it anywhere.
        if ldp.published {
            let assigned = ldp.assigned.expect("published implies assigned");
            if self.takeable(&assigned, ldp.priority, key) {
                return;
            }
            debug!(
                "{}: {} on {:?} displaced by a stronger advertisement",
                self.label, assigned, key.0
            );
            self.withdraw(key);
            // Fall through to find a replacement.
        }

        let ldp = self.ldps.get(&key).expect("ldp");
        // 3. An assignment we use but do not advertise: adopt it after
        //    the adopt delay, unless it stopped being viable.
        if let Some(current) = ldp.assigned {
            if !self.takeable(&current, PA_PRIORITY_ADOPT, key) {
                self.unassign(key);
                // Try to create a fresh one below.
            } else {
                let ldp = self.ldps.get_mut(&key).expect("ldp");
                if !ldp.adopting {
                    ldp.adopting = true;
                    ldp.backoff_until = Some(now + self.cfg.adopt_delay);
                    return;
                }
                match ldp.backoff_until {
                    Some(at) if now < at => return,
                    _ => {}
                }
                ldp.adopting = false;
                ldp.backoff_until = None;
                self.publish(key, current, PA_PRIORITY_ADOPT, PA_RULE_ADOPT);
                return;
            }
        }

        // 4. Nothing yet: create one via the rules, after the backoff.
        let ldp = self.ldps.get_mut(&key).expect("ldp");
        match ldp.backoff_until {
            None => {
                ldp.backoff_until = Some(now + self.cfg.backoff_delay);
                return;
            }
            Some(at) if now < at => return,
            Some(_) => {}
        }
        ldp.backoff_until = None;
        self.try_rules(key, dp);
    }

    fn try_rules(&mut self, key: (usize, usize), dp: Prefix) {
        let Some(link) = self.links.get(&key.0) else { return };
        let ctx = rules::RuleCtx {
            link_name: link.name.clone(),
            seed: link.seed.clone(),
            dp,
            space: self.candidate_space(&dp),
            desired_plen: self.desired_plen(link, &dp),
            address_mode: self.cfg.address_mode,
        };
        // Rules are kept sorted, strongest first.
        let rules: Vec<usize> = (0..self.rules.len()).collect();
        for ix in rules {
            let proposal = {
                let rule = &self.rules[ix];
                if !rule.applies(&ctx) {
                    continue;
                }
                rule.propose(&ctx, &|candidate, priority| {
                    self.takeable(candidate, priority, key)
                })
            };
            if let Some(p) = proposal {
                debug!(
                    "{}: rule {} proposes {} for {}",
                    self.label,
                    self.rules[ix].name(),
                    p.prefix,
                    ctx.link_name
                );
                self.publish(key, p.prefix, p.priority, p.rule_priority);
                return;
            }
        }
        debug!(
            "{}: no rule could assign within {} on {}",
            self.label, dp, ctx.link_name
        );
    }

    // ----- state changes -----

    fn accept_remote(
        &mut self,
        key: (usize, usize),
        dp: Prefix,
        prefix: Prefix,
        priority: u8,
    ) {
        let link = PaLinkId(key.0);
        let ldp = self.ldps.get_mut(&key).expect("ldp");
        ldp.adopting = false;
        ldp.backoff_until = None;
        if ldp.assigned == Some(prefix) && !ldp.published {
            ldp.priority = priority;
            return;
        }
        if ldp.assigned.is_some() {
            self.unassign(key);
        }
        let ldp = self.ldps.get_mut(&key).expect("ldp");
        ldp.assigned = Some(prefix);
        ldp.published = false;
        ldp.priority = priority;
        ldp.rule_priority = 0;
        ldp.apply_at = Some(self.now + self.cfg.flood_delay);
        self.events.push(PaEvent::Assigned {
            link,
            dp_prefix: dp,
            prefix,
        });
    }

    fn publish(
        &mut self,
        key: (usize, usize),
        prefix: Prefix,
        priority: u8,
        rule_priority: u32,
    ) {
        let link = PaLinkId(key.0);
        let dp = self.dps[&key.1];
        let ldp = self.ldps.get_mut(&key).expect("ldp");
        let newly_assigned = ldp.assigned != Some(prefix);
        if newly_assigned && ldp.assigned.is_some() {
            self.unassign(key);
        }
        let ldp = self.ldps.get_mut(&key).expect("ldp");
        ldp.assigned = Some(prefix);
        ldp.published = true;
        ldp.priority = priority;
        ldp.rule_priority = rule_priority;
        if newly_assigned {
            ldp.apply_at = Some(self.now + self.cfg.flood_delay);
        }
        info!(
            "{}: published {} priority {} on link #{}",
            self.label, prefix, priority, key.0
        );
        if newly_assigned {
            self.events.push(PaEvent::Assigned {
                link,
                dp_prefix: dp,
                prefix,
            });
        }
        self.events.push(PaEvent::Published {
            link,
            prefix,
            priority,
        });
    }

    fn withdraw(&mut self, key: (usize, usize)) {
        let link = PaLinkId(key.0);
        let ldp = self.ldps.get_mut(&key).expect("ldp");
        if ldp.published {
            let prefix = ldp.assigned.expect("published implies assigned");
            ldp.published = false;
            self.events.push(PaEvent::Unpublished { link, prefix });
        }
        self.unassign(key);
    }

    fn unassign(&mut self, key: (usize, usize)) {
        let link = PaLinkId(key.0);
        let ldp = self.ldps.get_mut(&key).expect("ldp");
        let Some(prefix) = ldp.assigned.take() else {
            return;
        };
        if ldp.applied {
            ldp.applied = false;
            self.events.push(PaEvent::Unapplied { link, prefix });
        }
        if ldp.published {
            ldp.published = false;
            self.events.push(PaEvent::Unpublished { link, prefix });
        }
        ldp.apply_at = None;
        ldp.adopting = false;
        self.events.push(PaEvent::Unassigned { link, prefix });
    }

    // ----- driving -----

    /// Run every pending routine and fire due timers; returns the events
    /// that happened, in order.
    pub fn run(&mut self, now: Time) -> Vec<PaEvent> {
        self.now = self.now.max(now);
        // Routines can cascade (a withdrawal frees space another link
        // then claims), so iterate to a fixed point with a safety bound.
        for _ in 0..8 {
            let dirty: Vec<_> = std::mem::take(&mut self.dirty)
                .into_iter()
                .collect();
            let mut timed: Vec<(usize, usize)> = Vec::new();
            for (key, ldp) in &self.ldps {
                if let Some(at) = ldp.backoff_until {
                    if self.now >= at && !dirty.contains(key) {
                        timed.push(*key);
                    }
                }
            }
            if dirty.is_empty() && timed.is_empty() {
                break;
            }
            let events_before = self.events.len();
            for key in dirty.into_iter().chain(timed) {
                self.routine(key);
            }
            if self.events.len() != events_before {
                self.mark_all_dirty();
            }
        }
        // Apply timers.
        let due: Vec<(usize, usize)> = self
            .ldps
            .iter()
            .filter(|(_, l)| {
                !l.applied
                    && l.assigned.is_some()
                    && matches!(l.apply_at, Some(at) if self.now >= at)
            })
            .map(|(k, _)| *k)
            .collect();
        for key in due {
            let dp = self.dps[&key.1];
            let ldp = self.ldps.get_mut(&key).expect("ldp");
            ldp.applied = true;
            ldp.apply_at = None;
            let prefix = ldp.assigned.expect("assigned");
            self.events.push(PaEvent::Applied {
                link: PaLinkId(key.0),
                dp_prefix: dp,
                prefix,
            });
        }
        std::mem::take(&mut self.events)
    }

    /// Earliest instant `run` needs to be called again.
    pub fn next_run(&self) -> Option<Time> {
        if !self.dirty.is_empty() {
            return Some(self.now);
        }
        let mut deadline = None;
        for ldp in self.ldps.values() {
            deadline = tmin(deadline, ldp.backoff_until);
            if !ldp.applied && ldp.assigned.is_some() {
                deadline = tmin(deadline, ldp.apply_at);
            }
        }
        deadline
    }
}
