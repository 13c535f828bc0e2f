//! The lattice framework.
//!
//! Abstract values are a tagged sum, [`Fact`]: the two-point lattice, the
//! component-wise pair, a keyed map of per-variable values, and a boxed
//! handle for client-defined lattices. Absence of a value (`None`) means
//! "top": no information yet. The free functions at the bottom of this
//! module lift every operation over `Option<&Fact>` with that convention.
//!
//! Operations return `(result, changed)`; `changed` must be `true` whenever
//! the result is not equal to the first argument. [`Fact::meet`] moves
//! toward bot (more approximate), [`Fact::join`] toward top (more precise),
//! and [`Fact::widen`] forces termination over lattices of unbounded
//! height. Every built-in value is immutable: operations hand back fresh
//! values, never views into their inputs.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

/// A client-defined lattice layered onto the built-in variant universe
/// through [`Fact::Ext`].
///
/// Implementations must be immutable: `meet`, `join` and `widen` return a
/// fresh allocation whenever they report a change. The framework checks the
/// fresh-allocation rule with a debug assertion.
pub trait ExtLattice: fmt::Debug + Send + Sync {
    /// Downcast support for clients reading their own values back.
    fn as_any(&self) -> &dyn Any;

    /// Returns `true` for the top element.
    fn is_top(&self) -> bool;

    /// Returns `true` for the bottom element.
    fn is_bot(&self) -> bool;

    /// Structural equality with another value of the same lattice.
    fn equals(&self, other: &dyn ExtLattice) -> bool;

    /// The partial order: `true` when `self` is at or below `other`.
    fn weaker_than(&self, other: &dyn ExtLattice) -> bool;

    /// Meet, toward bot.
    fn meet(&self, other: &dyn ExtLattice) -> (Arc<dyn ExtLattice>, bool);

    /// Join, toward top.
    fn join(&self, other: &dyn ExtLattice) -> (Arc<dyn ExtLattice>, bool);

    /// Widening; lattices of finite height can keep the default, which
    /// meets.
    fn widen(&self, other: &dyn ExtLattice) -> (Arc<dyn ExtLattice>, bool) {
        self.meet(other)
    }

    /// Human-readable rendering.
    fn stringify(&self) -> String;
}

/// The trivial two-point lattice, `Bot ⊑ Top`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopBot {
    /// The most precise value: nothing is known to conflict.
    Top,
    /// The most approximate value.
    Bot,
}

impl TopBot {
    /// Returns `true` for [`TopBot::Top`].
    #[must_use]
    pub fn is_top(self) -> bool {
        self == TopBot::Top
    }

    /// Returns `true` for [`TopBot::Bot`].
    #[must_use]
    pub fn is_bot(self) -> bool {
        self == TopBot::Bot
    }

    /// Meet: bot absorbs.
    #[must_use]
    pub fn meet(self, other: TopBot) -> (TopBot, bool) {
        match (self, other) {
            (TopBot::Bot, _) => (TopBot::Bot, false),
            (TopBot::Top, TopBot::Bot) => (TopBot::Bot, true),
            (TopBot::Top, TopBot::Top) => (TopBot::Top, false),
        }
    }

    /// Join: top absorbs.
    #[must_use]
    pub fn join(self, other: TopBot) -> (TopBot, bool) {
        match (self, other) {
            (TopBot::Top, _) => (TopBot::Top, false),
            (TopBot::Bot, TopBot::Top) => (TopBot::Top, true),
            (TopBot::Bot, TopBot::Bot) => (TopBot::Bot, false),
        }
    }

    /// The partial order.
    #[must_use]
    pub fn weaker_than(self, other: TopBot) -> bool {
        self == other || self == TopBot::Bot
    }
}

impl fmt::Display for TopBot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopBot::Top => write!(f, "Top"),
            TopBot::Bot => write!(f, "Bot"),
        }
    }
}

/// Two lattice slots lifted component-wise.
///
/// Every instruction carries one as its IN (`l1`) and OUT (`l2`) facts. A
/// pair also serves as the *branch pair* of a two-successor block, where
/// `l1` is the fact flowing down the true edge and `l2` down the false
/// edge.
#[derive(Debug, Clone, Default)]
pub struct FactPair {
    /// The first component: the IN fact, or the true-edge fact.
    pub l1: Option<Fact>,
    /// The second component: the OUT fact, or the false-edge fact.
    pub l2: Option<Fact>,
}

impl FactPair {
    /// Creates a pair from its components.
    #[must_use]
    pub fn new(l1: Option<Fact>, l2: Option<Fact>) -> Self {
        FactPair { l1, l2 }
    }

    /// Returns `true` when both components are top.
    #[must_use]
    pub fn is_top(&self) -> bool {
        is_top(self.l1.as_ref()) && is_top(self.l2.as_ref())
    }

    /// Returns `true` when both components are bot.
    #[must_use]
    pub fn is_bot(&self) -> bool {
        is_bot(self.l1.as_ref()) && is_bot(self.l2.as_ref())
    }

    /// Component-wise equality.
    #[must_use]
    pub fn equals(&self, other: &FactPair) -> bool {
        equals(self.l1.as_ref(), other.l1.as_ref()) && equals(self.l2.as_ref(), other.l2.as_ref())
    }

    /// Component-wise meet.
    #[must_use]
    pub fn meet(&self, other: &FactPair) -> (FactPair, bool) {
        let (l1, c1) = meet(self.l1.as_ref(), other.l1.as_ref());
        let (l2, c2) = meet(self.l2.as_ref(), other.l2.as_ref());
        (FactPair { l1, l2 }, c1 || c2)
    }

    /// Component-wise join.
    #[must_use]
    pub fn join(&self, other: &FactPair) -> (FactPair, bool) {
        let (l1, c1) = join(self.l1.as_ref(), other.l1.as_ref());
        let (l2, c2) = join(self.l2.as_ref(), other.l2.as_ref());
        (FactPair { l1, l2 }, c1 || c2)
    }

    /// Component-wise widening.
    #[must_use]
    pub fn widen(&self, other: &FactPair) -> (FactPair, bool) {
        let (l1, c1) = widen(self.l1.as_ref(), other.l1.as_ref());
        let (l2, c2) = widen(self.l2.as_ref(), other.l2.as_ref());
        (FactPair { l1, l2 }, c1 || c2)
    }

    /// Component-wise partial order.
    #[must_use]
    pub fn weaker_than(&self, other: &FactPair) -> bool {
        weaker_than(self.l1.as_ref(), other.l1.as_ref())
            && weaker_than(self.l2.as_ref(), other.l2.as_ref())
    }
}

impl fmt::Display for FactPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {})",
            stringify(self.l1.as_ref()),
            stringify(self.l2.as_ref())
        )
    }
}

/// A map from 64-bit keys (variable ids) to per-key facts, with optional
/// scoped inheritance through a parent map.
///
/// Parents are strictly older than their children and shared behind [`Arc`],
/// so chains are acyclic by construction. [`KvFact::get`] resolves through
/// the chain; binary operations flatten their result into a parentless map.
#[derive(Debug, Clone, Default)]
pub struct KvFact {
    parent: Option<Arc<KvFact>>,
    entries: FxHashMap<u64, Fact>,
}

impl KvFact {
    /// An empty map with no parent.
    #[must_use]
    pub fn new() -> Self {
        KvFact::default()
    }

    /// An empty map inheriting from `parent`.
    #[must_use]
    pub fn with_parent(parent: Arc<KvFact>) -> Self {
        KvFact {
            parent: Some(parent),
            entries: FxHashMap::default(),
        }
    }

    /// The parent map, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<KvFact>> {
        self.parent.as_ref()
    }

    /// Resolves `key`, walking up the parent chain on a local miss.
    #[must_use]
    pub fn get(&self, key: u64) -> Option<&Fact> {
        if let Some(value) = self.entries.get(&key) {
            return Some(value);
        }
        self.parent.as_deref().and_then(|p| p.get(key))
    }

    /// Binds `key`.
    ///
    /// With `must` the binding is unconditional ("must" information);
    /// otherwise the new value is met with the current or inherited one and
    /// stored only if that changed anything. Returns whether the map
    /// changed.
    pub fn set(&mut self, key: u64, value: Fact, must: bool) -> bool {
        let old = self.get(key).cloned();
        if must {
            if !equals(old.as_ref(), Some(&value)) {
                self.entries.insert(key, value);
                return true;
            }
            false
        } else {
            let (merged, changed) = meet(old.as_ref(), Some(&value));
            if changed {
                if let Some(merged) = merged {
                    self.entries.insert(key, merged);
                }
            }
            changed
        }
    }

    /// Every key visible through this map, in ascending order.
    #[must_use]
    pub fn keys(&self) -> BTreeSet<u64> {
        let mut keys = match self.parent.as_deref() {
            Some(parent) => parent.keys(),
            None => BTreeSet::new(),
        };
        keys.extend(self.entries.keys().copied());
        keys
    }

    /// Returns `true` when every visible value is top.
    #[must_use]
    pub fn is_top(&self) -> bool {
        self.keys()
            .iter()
            .all(|&k| is_top(self.get(k)))
    }

    /// Key-wise equality over the union of visible keys.
    #[must_use]
    pub fn equals(&self, other: &KvFact) -> bool {
        let mut keys = self.keys();
        keys.extend(other.keys());
        keys.iter().all(|&k| equals(self.get(k), other.get(k)))
    }

    /// Key-wise meet; the result is flattened into a parentless map.
    #[must_use]
    pub fn meet(&self, other: &KvFact) -> (KvFact, bool) {
        self.combine(other, meet)
    }

    /// Key-wise join; the result is flattened into a parentless map.
    #[must_use]
    pub fn join(&self, other: &KvFact) -> (KvFact, bool) {
        self.combine(other, join)
    }

    /// Key-wise widening; the result is flattened into a parentless map.
    #[must_use]
    pub fn widen(&self, other: &KvFact) -> (KvFact, bool) {
        self.combine(other, widen)
    }

    fn combine(
        &self,
        other: &KvFact,
        op: fn(Option<&Fact>, Option<&Fact>) -> (Option<Fact>, bool),
    ) -> (KvFact, bool) {
        let mut keys = self.keys();
        keys.extend(other.keys());
        let mut out = KvFact::new();
        let mut changed = false;
        for key in keys {
            let (value, c) = op(self.get(key), other.get(key));
            changed |= c;
            if let Some(value) = value {
                out.entries.insert(key, value);
            }
        }
        (out, changed)
    }

    /// Key-wise partial order over the union of visible keys.
    #[must_use]
    pub fn weaker_than(&self, other: &KvFact) -> bool {
        let mut keys = self.keys();
        keys.extend(other.keys());
        keys.iter()
            .all(|&k| weaker_than(self.get(k), other.get(k)))
    }
}

impl fmt::Display for KvFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, key) in self.keys().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:#x}: {}", key, stringify(self.get(*key)))?;
        }
        write!(f, "}}")
    }
}

/// An abstract value: one variant per built-in lattice, plus the extension
/// handle.
#[derive(Debug, Clone)]
pub enum Fact {
    /// A two-point value.
    TopBot(TopBot),
    /// A component-wise pair, also used as the branch pair of a
    /// two-successor block.
    Pair(Box<FactPair>),
    /// A keyed map of per-variable values.
    Map(KvFact),
    /// A client-defined lattice value.
    Ext(Arc<dyn ExtLattice>),
}

impl Fact {
    /// The two-point top value.
    #[must_use]
    pub fn top() -> Fact {
        Fact::TopBot(TopBot::Top)
    }

    /// The two-point bot value.
    #[must_use]
    pub fn bot() -> Fact {
        Fact::TopBot(TopBot::Bot)
    }

    /// Wraps a pair.
    #[must_use]
    pub fn pair(pair: FactPair) -> Fact {
        Fact::Pair(Box::new(pair))
    }

    /// Wraps a client lattice value.
    #[must_use]
    pub fn ext<L: ExtLattice + 'static>(value: L) -> Fact {
        Fact::Ext(Arc::new(value))
    }

    /// Returns `true` for a top value.
    #[must_use]
    pub fn is_top(&self) -> bool {
        match self {
            Fact::TopBot(v) => v.is_top(),
            Fact::Pair(p) => p.is_top(),
            Fact::Map(m) => m.is_top(),
            Fact::Ext(e) => e.is_top(),
        }
    }

    /// Returns `true` for a bot value.
    #[must_use]
    pub fn is_bot(&self) -> bool {
        match self {
            Fact::TopBot(v) => v.is_bot(),
            Fact::Pair(p) => p.is_bot(),
            // A map can never witness every possible key at bot.
            Fact::Map(_) => false,
            Fact::Ext(e) => e.is_bot(),
        }
    }

    /// The pair behind this value, if it is one.
    #[must_use]
    pub fn as_pair(&self) -> Option<&FactPair> {
        match self {
            Fact::Pair(p) => Some(p),
            _ => None,
        }
    }

    /// The pair behind this value.
    ///
    /// # Panics
    ///
    /// Panics when the value is not a pair. The driver calls this on the
    /// OUT fact of a branching block; a client that stored anything else
    /// there has violated its contract.
    #[must_use]
    pub fn expect_pair(&self) -> &FactPair {
        self.as_pair()
            .unwrap_or_else(|| panic!("expected a lattice pair, found {self}"))
    }

    /// The map behind this value, if it is one.
    #[must_use]
    pub fn as_map(&self) -> Option<&KvFact> {
        match self {
            Fact::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Structural equality.
    ///
    /// Values of different variants are never structurally equal; the free
    /// [`equals`] additionally identifies all top values (and all bot
    /// values) with each other.
    #[must_use]
    pub fn equals(&self, other: &Fact) -> bool {
        match (self, other) {
            (Fact::TopBot(a), Fact::TopBot(b)) => a == b,
            (Fact::Pair(a), Fact::Pair(b)) => a.equals(b),
            (Fact::Map(a), Fact::Map(b)) => a.equals(b),
            (Fact::Ext(a), Fact::Ext(b)) => a.equals(b.as_ref()),
            _ => false,
        }
    }

    /// The partial order: `true` when `self` is at or below `other`.
    #[must_use]
    pub fn weaker_than(&self, other: &Fact) -> bool {
        match (self, other) {
            (Fact::TopBot(a), Fact::TopBot(b)) => a.weaker_than(*b),
            (Fact::Pair(a), Fact::Pair(b)) => a.weaker_than(b),
            (Fact::Map(a), Fact::Map(b)) => a.weaker_than(b),
            (Fact::Ext(a), Fact::Ext(b)) => a.weaker_than(b.as_ref()),
            _ => other.is_top() || self.is_bot(),
        }
    }

    /// Meet, toward bot.
    #[must_use]
    pub fn meet(&self, other: &Fact) -> (Fact, bool) {
        match (self, other) {
            (Fact::TopBot(a), Fact::TopBot(b)) => {
                let (r, c) = a.meet(*b);
                (Fact::TopBot(r), c)
            }
            (Fact::Pair(a), Fact::Pair(b)) => {
                let (r, c) = a.meet(b);
                (Fact::pair(r), c)
            }
            (Fact::Map(a), Fact::Map(b)) => {
                let (r, c) = a.meet(b);
                (Fact::Map(r), c)
            }
            (Fact::Ext(a), Fact::Ext(b)) => {
                let (r, c) = a.meet(b.as_ref());
                if c {
                    debug_assert!(
                        !Arc::ptr_eq(a, &r),
                        "a changed lattice value must be a fresh allocation"
                    );
                }
                (Fact::Ext(r), c)
            }
            _ => {
                debug_assert!(false, "meet of mismatched lattices {self} and {other}");
                (self.clone(), false)
            }
        }
    }

    /// Join, toward top.
    #[must_use]
    pub fn join(&self, other: &Fact) -> (Fact, bool) {
        match (self, other) {
            (Fact::TopBot(a), Fact::TopBot(b)) => {
                let (r, c) = a.join(*b);
                (Fact::TopBot(r), c)
            }
            (Fact::Pair(a), Fact::Pair(b)) => {
                let (r, c) = a.join(b);
                (Fact::pair(r), c)
            }
            (Fact::Map(a), Fact::Map(b)) => {
                let (r, c) = a.join(b);
                (Fact::Map(r), c)
            }
            (Fact::Ext(a), Fact::Ext(b)) => {
                let (r, c) = a.join(b.as_ref());
                if c {
                    debug_assert!(
                        !Arc::ptr_eq(a, &r),
                        "a changed lattice value must be a fresh allocation"
                    );
                }
                (Fact::Ext(r), c)
            }
            _ => {
                debug_assert!(false, "join of mismatched lattices {self} and {other}");
                (self.clone(), false)
            }
        }
    }

    /// Widening. The built-in lattices have finite height and delegate to
    /// meet; client lattices supply their own.
    #[must_use]
    pub fn widen(&self, other: &Fact) -> (Fact, bool) {
        match (self, other) {
            (Fact::Ext(a), Fact::Ext(b)) => {
                let (r, c) = a.widen(b.as_ref());
                (Fact::Ext(r), c)
            }
            _ => self.meet(other),
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fact::TopBot(v) => fmt::Display::fmt(v, f),
            Fact::Pair(p) => fmt::Display::fmt(p, f),
            Fact::Map(m) => fmt::Display::fmt(m, f),
            Fact::Ext(e) => write!(f, "{}", e.stringify()),
        }
    }
}

// ---------------------------------------------------------------------------
// Free functions: nullable lattice values, null meaning top.
// ---------------------------------------------------------------------------

/// Meet over nullable values.
///
/// `None` is top: meeting it with anything yields the other side, and the
/// change flag tracks whether the *first* argument moved.
#[must_use]
pub fn meet(l1: Option<&Fact>, l2: Option<&Fact>) -> (Option<Fact>, bool) {
    match (l1, l2) {
        (None, None) => (None, false),
        (None, Some(y)) => (Some(y.clone()), true),
        (Some(x), None) => (Some(x.clone()), false),
        (Some(x), Some(y)) => {
            let (r, c) = x.meet(y);
            (Some(r), c)
        }
    }
}

/// Join over nullable values; `None` (top) absorbs.
#[must_use]
pub fn join(l1: Option<&Fact>, l2: Option<&Fact>) -> (Option<Fact>, bool) {
    match (l1, l2) {
        (None, _) => (None, false),
        (Some(x), None) => (Some(x.clone()), true),
        (Some(x), Some(y)) => {
            let (r, c) = x.join(y);
            (Some(r), c)
        }
    }
}

/// Widening over nullable values; mirrors [`meet`]'s null handling.
#[must_use]
pub fn widen(l1: Option<&Fact>, l2: Option<&Fact>) -> (Option<Fact>, bool) {
    match (l1, l2) {
        (None, None) => (None, false),
        (None, Some(y)) => (Some(y.clone()), true),
        (Some(x), None) => (Some(x.clone()), false),
        (Some(x), Some(y)) => {
            let (r, c) = x.widen(y);
            (Some(r), c)
        }
    }
}

/// Equality over nullable values.
///
/// All top values are equal to each other, as are all bot values, without
/// consulting the instances.
#[must_use]
pub fn equals(l1: Option<&Fact>, l2: Option<&Fact>) -> bool {
    if is_top(l1) && is_top(l2) || is_bot(l1) && is_bot(l2) {
        return true;
    }
    match (l1, l2) {
        (Some(x), Some(y)) => x.equals(y),
        _ => false,
    }
}

/// Partial order over nullable values; everything is weaker than top.
#[must_use]
pub fn weaker_than(l1: Option<&Fact>, l2: Option<&Fact>) -> bool {
    match (l1, l2) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(x), Some(y)) => x.weaker_than(y),
    }
}

/// Returns `true` for `None` and for top values.
#[must_use]
pub fn is_top(l: Option<&Fact>) -> bool {
    l.map_or(true, Fact::is_top)
}

/// Returns `true` for bot values; `None` is top, not bot.
#[must_use]
pub fn is_bot(l: Option<&Fact>) -> bool {
    l.is_some_and(Fact::is_bot)
}

/// Renders a nullable value.
#[must_use]
pub fn stringify(l: Option<&Fact>) -> String {
    match l {
        Some(fact) => fact.to_string(),
        None => "nil".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topbot_meet_laws() {
        let cases = [TopBot::Top, TopBot::Bot];
        for &x in &cases {
            for &y in &cases {
                // Commutativity.
                assert_eq!(x.meet(y).0, y.meet(x).0);
                for &z in &cases {
                    // Associativity.
                    assert_eq!(x.meet(y.meet(z).0).0, x.meet(y).0.meet(z).0);
                }
            }
            // Identity and absorption.
            assert_eq!(x.meet(TopBot::Top).0, x);
            assert_eq!(x.meet(TopBot::Bot).0, TopBot::Bot);
            assert!(x.meet(TopBot::Bot).0.weaker_than(x));
        }
    }

    #[test]
    fn test_topbot_change_flags() {
        assert_eq!(TopBot::Top.meet(TopBot::Bot), (TopBot::Bot, true));
        assert_eq!(TopBot::Bot.meet(TopBot::Top), (TopBot::Bot, false));
        assert_eq!(TopBot::Bot.join(TopBot::Top), (TopBot::Top, true));
        assert_eq!(TopBot::Top.join(TopBot::Bot), (TopBot::Top, false));
    }

    #[test]
    fn test_null_as_top_meet() {
        let bot = Fact::bot();
        let (r, changed) = meet(None, Some(&bot));
        assert!(r.is_some_and(|f| f.is_bot()));
        assert!(changed, "null refined to a value is a change");

        let (r, changed) = meet(Some(&bot), None);
        assert!(r.is_some_and(|f| f.is_bot()));
        assert!(!changed, "meeting with null changes nothing");

        let (r, changed) = meet(None, None);
        assert!(r.is_none());
        assert!(!changed);
    }

    #[test]
    fn test_null_join_table() {
        let bot = Fact::bot();
        assert!(matches!(join(None, Some(&bot)), (None, false)));
        let (r, changed) = join(Some(&bot), None);
        assert!(r.is_some());
        assert!(changed);
    }

    #[test]
    fn test_null_equality_and_order() {
        let top = Fact::top();
        let bot = Fact::bot();
        assert!(equals(None, None));
        assert!(equals(None, Some(&top)), "null and Top are both top");
        assert!(!equals(None, Some(&bot)));
        assert!(weaker_than(Some(&bot), None));
        assert!(weaker_than(None, None));
        assert!(!weaker_than(None, Some(&bot)));
    }

    #[test]
    fn test_pair_lifts_componentwise() {
        let p1 = FactPair::new(Some(Fact::top()), Some(Fact::bot()));
        let p2 = FactPair::new(Some(Fact::bot()), Some(Fact::bot()));
        let (met, changed) = p1.meet(&p2);
        assert!(changed, "first component moved from Top to Bot");
        assert!(met.l1.as_ref().is_some_and(Fact::is_bot));
        assert!(met.l2.as_ref().is_some_and(Fact::is_bot));
        assert!(met.is_bot());
        assert!(!met.is_top());

        let (_, changed) = p2.meet(&p1.clone());
        assert!(!changed, "meet into an already-bot pair changes nothing");
    }

    #[test]
    fn test_pair_as_fact() {
        let branch = Fact::pair(FactPair::new(Some(Fact::bot()), Some(Fact::top())));
        let pair = branch.expect_pair();
        assert!(pair.l1.as_ref().is_some_and(Fact::is_bot));
        assert!(branch.as_map().is_none());
    }

    #[test]
    #[should_panic(expected = "expected a lattice pair")]
    fn test_expect_pair_panics_on_mismatch() {
        let _ = Fact::bot().expect_pair();
    }

    #[test]
    fn test_kv_get_walks_parent_chain() {
        let mut grandparent = KvFact::new();
        grandparent.set(1, Fact::bot(), true);
        let mut parent = KvFact::with_parent(Arc::new(grandparent));
        parent.set(2, Fact::top(), true);
        let child = KvFact::with_parent(Arc::new(parent));

        assert!(child.get(1).is_some_and(Fact::is_bot));
        assert!(child.get(2).is_some_and(Fact::is_top));
        assert!(child.get(3).is_none());
        assert_eq!(child.keys().len(), 2);
    }

    #[test]
    fn test_kv_set_must_overwrites() {
        let mut kv = KvFact::new();
        assert!(kv.set(1, Fact::top(), true));
        assert!(!kv.set(1, Fact::top(), true), "same value, no change");
        assert!(kv.set(1, Fact::bot(), true));
        assert!(kv.get(1).is_some_and(Fact::is_bot));
    }

    #[test]
    fn test_kv_set_may_meets() {
        let mut kv = KvFact::new();
        // No current value: the new one lands as-is.
        assert!(kv.set(1, Fact::top(), false));
        // Meeting Top with Bot moves to Bot.
        assert!(kv.set(1, Fact::bot(), false));
        assert!(kv.get(1).is_some_and(Fact::is_bot));
        // Bot meets anything without change.
        assert!(!kv.set(1, Fact::top(), false));
    }

    #[test]
    fn test_kv_shadowing_writes_locally() {
        let mut parent = KvFact::new();
        parent.set(1, Fact::top(), true);
        let parent = Arc::new(parent);
        let mut child = KvFact::with_parent(Arc::clone(&parent));

        assert!(child.set(1, Fact::bot(), false), "inherited Top meets Bot");
        assert!(child.get(1).is_some_and(Fact::is_bot));
        assert!(parent.get(1).is_some_and(Fact::is_top), "parent untouched");
    }

    #[test]
    fn test_kv_meet_flattens() {
        let mut a = KvFact::new();
        a.set(1, Fact::top(), true);
        a.set(2, Fact::bot(), true);
        let mut b = KvFact::new();
        b.set(1, Fact::bot(), true);

        let (met, changed) = a.meet(&b);
        assert!(changed);
        assert!(met.parent().is_none());
        assert!(met.get(1).is_some_and(Fact::is_bot));
        assert!(met.get(2).is_some_and(Fact::is_bot), "missing key is top");
    }

    #[test]
    fn test_fact_equals_across_variants() {
        assert!(!Fact::bot().equals(&Fact::Map(KvFact::new())));
        // The free function identifies top with an all-top map.
        assert!(equals(
            Some(&Fact::top()),
            Some(&Fact::Map(KvFact::new()))
        ));
    }

    /// A three-point sign lattice exercising the extension handle.
    #[derive(Debug, PartialEq, Clone, Copy)]
    enum Sign {
        Top,
        NonNegative,
        Bot,
    }

    impl ExtLattice for Sign {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn is_top(&self) -> bool {
            matches!(self, Sign::Top)
        }

        fn is_bot(&self) -> bool {
            matches!(self, Sign::Bot)
        }

        fn equals(&self, other: &dyn ExtLattice) -> bool {
            other
                .as_any()
                .downcast_ref::<Sign>()
                .is_some_and(|o| self == o)
        }

        fn weaker_than(&self, other: &dyn ExtLattice) -> bool {
            let Some(other) = other.as_any().downcast_ref::<Sign>() else {
                return false;
            };
            self == other || matches!(self, Sign::Bot) || matches!(other, Sign::Top)
        }

        fn meet(&self, other: &dyn ExtLattice) -> (Arc<dyn ExtLattice>, bool) {
            let other = other
                .as_any()
                .downcast_ref::<Sign>()
                .copied()
                .unwrap_or(Sign::Bot);
            let result = match (*self, other) {
                (Sign::Top, x) => x,
                (x, Sign::Top) => x,
                (x, y) if x == y => x,
                _ => Sign::Bot,
            };
            (Arc::new(result), result != *self)
        }

        fn join(&self, other: &dyn ExtLattice) -> (Arc<dyn ExtLattice>, bool) {
            let other = other
                .as_any()
                .downcast_ref::<Sign>()
                .copied()
                .unwrap_or(Sign::Top);
            let result = match (*self, other) {
                (Sign::Bot, x) => x,
                (x, Sign::Bot) => x,
                (x, y) if x == y => x,
                _ => Sign::Top,
            };
            (Arc::new(result), result != *self)
        }

        fn stringify(&self) -> String {
            format!("{self:?}")
        }
    }

    #[test]
    fn test_ext_lattice_round_trip() {
        let a = Fact::ext(Sign::NonNegative);
        let b = Fact::ext(Sign::Top);
        let (met, changed) = a.meet(&b);
        assert!(!changed, "meet with top is the identity");
        assert!(met.equals(&a));

        let (met, changed) = a.meet(&Fact::ext(Sign::Bot));
        assert!(changed);
        assert!(met.is_bot());
        assert!(a.weaker_than(&b));
        assert!(!b.weaker_than(&a));
    }

    #[test]
    fn test_ext_downcast() {
        let fact = Fact::ext(Sign::NonNegative);
        let Fact::Ext(handle) = &fact else {
            panic!("not an ext value");
        };
        assert_eq!(
            handle.as_any().downcast_ref::<Sign>(),
            Some(&Sign::NonNegative)
        );
    }
}
