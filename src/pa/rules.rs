// SPDX-License-Identifier: MIT

//! Assignment rules, strongest first: operator-configured statics,
//! link-id bit fields, stored prefixes, pseudo-random generation, and the
//! scarcity override that displaces weaker assignments when the random
//! rule runs dry.

use std::cell::RefCell;
use std::net::Ipv6Addr;
use std::rc::Rc;

use crate::hash::pseudo_random_bytes;
use crate::ip::Prefix;

use super::store::{PaStore, StoreCategory};
use super::{
    PA_PRIORITY_CREATE, PA_PRIORITY_SCARCITY, PA_PRIORITY_STATIC,
    PA_PRIORITY_STORE, PA_RAND_TENTATIVES, PA_RULE_ADDRESS, PA_RULE_CREATE,
    PA_RULE_LINK_ID, PA_RULE_SCARCITY, PA_RULE_STATIC, PA_RULE_STORE,
};

/// Everything a rule may look at when proposing a prefix.
pub struct RuleCtx {
    pub link_name: String,
    /// Deterministic per-link seed for pseudo-random candidates.
    pub seed: Vec<u8>,
    /// The delegated prefix being carved.
    pub dp: Prefix,
    /// Candidate space (the whole dp, or its first quarter for
    /// addresses).
    pub space: Prefix,
    pub desired_plen: u8,
    pub address_mode: bool,
}

pub struct Proposal {
    pub prefix: Prefix,
    pub priority: u8,
    pub rule_priority: u32,
}

pub trait PaRule {
    fn name(&self) -> &str;
    fn rule_priority(&self) -> u32;

    fn applies(&self, ctx: &RuleCtx) -> bool {
        let _ = ctx;
        true
    }

    /// Offer a prefix; `takeable(candidate, priority)` tells whether the
    /// candidate survives against everything currently advertised.
    fn propose(
        &self,
        ctx: &RuleCtx,
        takeable: &dyn Fn(&Prefix, u8) -> bool,
    ) -> Option<Proposal>;
}

fn link_matches(filter: &Option<String>, ctx: &RuleCtx) -> bool {
    filter.as_deref().map_or(true, |name| name == ctx.link_name)
}

/// Extend `dp` to `plen` bits, encoding `value` in the new low bits.
fn extend_with_value(dp: &Prefix, plen: u8, value: u32) -> Prefix {
    let ext_bits = u32::from(plen - dp.plen());
    let mut octets = dp.addr().octets();
    for j in 0..ext_bits {
        let bit = if ext_bits - 1 - j < 32 {
            (value >> (ext_bits - 1 - j)) & 1
        } else {
            0
        };
        if bit != 0 {
            let pos = usize::from(dp.plen()) + j as usize;
            octets[pos / 8] |= 0x80 >> (pos % 8);
        }
    }
    Prefix::new(Ipv6Addr::from(octets), plen)
}

/// Operator-configured exact prefix for a link.
pub struct StaticRule {
    pub link: Option<String>,
    pub prefix: Prefix,
    pub priority: u8,
}

impl StaticRule {
    pub fn new(link: &str, prefix: Prefix) -> Self {
        StaticRule {
            link: Some(link.to_string()),
            prefix,
            priority: PA_PRIORITY_STATIC,
        }
    }
}

impl PaRule for StaticRule {
    fn name(&self) -> &str {
        "static prefix"
    }

    fn rule_priority(&self) -> u32 {
        PA_RULE_STATIC
    }

    fn applies(&self, ctx: &RuleCtx) -> bool {
        link_matches(&self.link, ctx) && ctx.dp.contains(&self.prefix)
    }

    fn propose(
        &self,
        _ctx: &RuleCtx,
        takeable: &dyn Fn(&Prefix, u8) -> bool,
    ) -> Option<Proposal> {
        takeable(&self.prefix, self.priority).then_some(Proposal {
            prefix: self.prefix,
            priority: self.priority,
            rule_priority: PA_RULE_STATIC,
        })
    }
}

/// Operator-configured bit field within whatever prefix gets delegated.
pub struct LinkIdRule {
    pub link: Option<String>,
    pub id: u32,
}

impl LinkIdRule {
    pub fn new(link: &str, id: u32) -> Self {
        LinkIdRule {
            link: Some(link.to_string()),
            id,
        }
    }
}

impl PaRule for LinkIdRule {
    fn name(&self) -> &str {
        "link id"
    }

    fn rule_priority(&self) -> u32 {
        PA_RULE_LINK_ID
    }

    fn applies(&self, ctx: &RuleCtx) -> bool {
        link_matches(&self.link, ctx)
            && !ctx.address_mode
            && ctx.desired_plen > ctx.dp.plen()
    }

    fn propose(
        &self,
        ctx: &RuleCtx,
        takeable: &dyn Fn(&Prefix, u8) -> bool,
    ) -> Option<Proposal> {
        let candidate =
            extend_with_value(&ctx.dp, ctx.desired_plen, self.id);
        takeable(&candidate, super::PA_PRIORITY_LINK_ID).then_some(Proposal {
            prefix: candidate,
            priority: super::PA_PRIORITY_LINK_ID,
            rule_priority: PA_RULE_LINK_ID,
        })
    }
}

/// Operator-configured host address for a link (address mode only).
pub struct AddressRule {
    pub link: Option<String>,
    pub address: Ipv6Addr,
}

impl AddressRule {
    pub fn new(link: &str, address: Ipv6Addr) -> Self {
        AddressRule {
            link: Some(link.to_string()),
            address,
        }
    }
}

impl PaRule for AddressRule {
    fn name(&self) -> &str {
        "static address"
    }

    fn rule_priority(&self) -> u32 {
        PA_RULE_ADDRESS
    }

    fn applies(&self, ctx: &RuleCtx) -> bool {
        link_matches(&self.link, ctx)
            && ctx.address_mode
            && ctx.dp.contains_addr(&self.address)
    }

    fn propose(
        &self,
        _ctx: &RuleCtx,
        takeable: &dyn Fn(&Prefix, u8) -> bool,
    ) -> Option<Proposal> {
        let candidate = Prefix::new(self.address, 128);
        takeable(&candidate, PA_PRIORITY_STATIC).then_some(Proposal {
            prefix: candidate,
            priority: PA_PRIORITY_STATIC,
            rule_priority: PA_RULE_ADDRESS,
        })
    }
}

/// Re-use a prefix remembered in stable storage for this link.
pub struct StorageRule {
    pub store: Rc<RefCell<PaStore>>,
}

impl PaRule for StorageRule {
    fn name(&self) -> &str {
        "stored prefix"
    }

    fn rule_priority(&self) -> u32 {
        PA_RULE_STORE
    }

    fn propose(
        &self,
        ctx: &RuleCtx,
        takeable: &dyn Fn(&Prefix, u8) -> bool,
    ) -> Option<Proposal> {
        let category = if ctx.address_mode {
            StoreCategory::Address
        } else {
            StoreCategory::Prefix
        };
        let store = self.store.borrow();
        for stored in store.prefixes(category, &ctx.link_name) {
            if ctx.dp.contains(stored)
                && takeable(stored, PA_PRIORITY_STORE)
            {
                return Some(Proposal {
                    prefix: *stored,
                    priority: PA_PRIORITY_STORE,
                    rule_priority: PA_RULE_STORE,
                });
            }
        }
        None
    }
}

/// Pseudo-random generation: a bounded number of deterministic
/// tentatives seeded by the link seed, first non-colliding one wins.
pub struct RandomRule {
    pub tentatives: u32,
}

impl Default for RandomRule {
    fn default() -> Self {
        RandomRule {
            tentatives: PA_RAND_TENTATIVES,
        }
    }
}

impl PaRule for RandomRule {
    fn name(&self) -> &str {
        "random prefix"
    }

    fn rule_priority(&self) -> u32 {
        PA_RULE_CREATE
    }

    fn applies(&self, ctx: &RuleCtx) -> bool {
        ctx.desired_plen >= ctx.space.plen()
    }

    fn propose(
        &self,
        ctx: &RuleCtx,
        takeable: &dyn Fn(&Prefix, u8) -> bool,
    ) -> Option<Proposal> {
        let mut bits = [0u8; 16];
        for i in 0..self.tentatives {
            pseudo_random_bytes(&ctx.seed, i, &mut bits);
            let candidate = ctx.space.extend(&bits, ctx.desired_plen);
            if takeable(&candidate, PA_PRIORITY_CREATE) {
                return Some(Proposal {
                    prefix: candidate,
                    priority: PA_PRIORITY_CREATE,
                    rule_priority: PA_RULE_CREATE,
                });
            }
        }
        None
    }
}

/// Last resort under scarcity: generate at override priority and plen,
/// displacing whatever weaker assignment is in the way.
pub struct ScarcityRule {
    pub tentatives: u32,
}

impl Default for ScarcityRule {
    fn default() -> Self {
        ScarcityRule {
            tentatives: PA_RAND_TENTATIVES,
        }
    }
}

impl ScarcityRule {
    fn desired_plen(cfg_address_mode: bool, dp: &Prefix) -> u8 {
        if cfg_address_mode {
            128
        } else if dp.is_ipv4() {
            124
        } else {
            80
        }
    }
}

impl PaRule for ScarcityRule {
    fn name(&self) -> &str {
        "scarcity override"
    }

    fn rule_priority(&self) -> u32 {
        PA_RULE_SCARCITY
    }

    fn applies(&self, ctx: &RuleCtx) -> bool {
        Self::desired_plen(ctx.address_mode, &ctx.dp) >= ctx.space.plen()
    }

    fn propose(
        &self,
        ctx: &RuleCtx,
        takeable: &dyn Fn(&Prefix, u8) -> bool,
    ) -> Option<Proposal> {
        let plen = Self::desired_plen(ctx.address_mode, &ctx.dp);
        let mut bits = [0u8; 16];
        for i in 0..self.tentatives {
            // Distinct counter range from the plain random rule so the
            // two never walk the same candidate sequence.
            pseudo_random_bytes(&ctx.seed, 0x8000_0000 | i, &mut bits);
            let candidate = ctx.space.extend(&bits, plen);
            if takeable(&candidate, PA_PRIORITY_SCARCITY) {
                return Some(Proposal {
                    prefix: candidate,
                    priority: PA_PRIORITY_SCARCITY,
                    rule_priority: PA_RULE_SCARCITY,
                });
            }
        }
        None
    }
}
