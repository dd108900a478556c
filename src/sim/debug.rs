//! Utilities to debug simulation.
//!
//! The key type here is [`Breakpoints`], the set of addresses
//! where [`Simulator::go`] stops before executing.
//!
//! [`Simulator::go`]: crate::sim::Simulator::go
use std::collections::BTreeMap;

/// A set of address breakpoints.
///
/// Each breakpoint can be individually enabled or disabled,
/// and all breakpoints can be disabled at once with [`Breakpoints::toggle_all`].
///
/// ## Example
///
/// ```
/// use mips_ensemble::sim::debug::Breakpoints;
///
/// let mut bps = Breakpoints::new();
/// bps.add(0x0040_0008);
/// assert!(bps.check(0x0040_0008));
///
/// bps.toggle(0x0040_0008);
/// assert!(!bps.check(0x0040_0008));
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Breakpoints {
    addrs: BTreeMap<u32, bool>,
    enabled: bool,
}
impl Breakpoints where Breakpoints: Send + Sync { /* assert Breakpoints is send/sync */ }

impl Breakpoints {
    /// Creates an empty breakpoint set.
    pub fn new() -> Self {
        Self { addrs: BTreeMap::new(), enabled: true }
    }

    /// Adds an enabled breakpoint at the given address.
    ///
    /// This returns whether the breakpoint is new.
    pub fn add(&mut self, addr: u32) -> bool {
        self.addrs.insert(addr, true).is_none()
    }

    /// Removes the breakpoint at the given address.
    ///
    /// This returns whether there was a breakpoint there.
    pub fn remove(&mut self, addr: u32) -> bool {
        self.addrs.remove(&addr).is_some()
    }

    /// Enables or disables the breakpoint at the given address.
    ///
    /// This returns the new enabled state, or `None` if there is no breakpoint there.
    pub fn toggle(&mut self, addr: u32) -> Option<bool> {
        let enabled = self.addrs.get_mut(&addr)?;
        *enabled = !*enabled;
        Some(*enabled)
    }

    /// Enables or disables all breakpoints at once,
    /// without changing any individual breakpoint's state.
    ///
    /// This returns whether breakpoints are now enabled.
    pub fn toggle_all(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    /// Removes every breakpoint.
    pub fn clear(&mut self) {
        self.addrs.clear();
    }

    /// Checks if execution should break at the given address.
    pub fn check(&self, addr: u32) -> bool {
        self.enabled && self.addrs.get(&addr).copied().unwrap_or(false)
    }

    /// Iterates over every breakpoint (with whether it is enabled), in address order.
    pub fn iter(&self) -> impl Iterator<Item=(u32, bool)> + '_ {
        self.addrs.iter().map(|(&a, &e)| (a, e))
    }

    /// The number of breakpoints.
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    /// Whether there are no breakpoints.
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}
impl Default for Breakpoints {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Breakpoints;

    #[test]
    fn test_toggle_all() {
        let mut bps = Breakpoints::new();
        assert!(bps.add(0x0040_0000));
        assert!(bps.add(0x0040_0004));
        assert!(!bps.add(0x0040_0004));
        assert_eq!(bps.toggle(0x0040_0004), Some(false));
        assert_eq!(bps.toggle(0x0040_0010), None);

        assert!(!bps.toggle_all());
        assert!(!bps.check(0x0040_0000));

        // individual states survive disabling everything
        assert!(bps.toggle_all());
        assert!(bps.check(0x0040_0000));
        assert!(!bps.check(0x0040_0004));
        assert_eq!(bps.iter().collect::<Vec<_>>(), [(0x0040_0000, true), (0x0040_0004, false)]);

        assert!(bps.remove(0x0040_0000));
        assert!(!bps.remove(0x0040_0000));
        bps.clear();
        assert!(bps.is_empty());
    }
}
