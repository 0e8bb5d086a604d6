// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

use plcconnector_core::encap::Identity;
use std::time::Duration;

/// reply budget of unconnected messages, bytes of tag data
pub(crate) const UNCONNECTED_REPLY_BUDGET: usize = 472;
/// largest unconnected reply a client accepts
pub(crate) const MAX_REPLY_BUDGET: usize = 504;

/// server settings
///
/// # Examples
/// ```rust
/// use plcconnector_async::Options;
/// use std::time::Duration;
///
/// let mut opts = Options::default();
/// opts.idle_timeout(Duration::from_secs(10))
///     .max_sessions(4)
///     .product_name("line 3");
/// assert_eq!(opts.get_max_sessions(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    pub(crate) idle_timeout: Duration,
    pub(crate) max_sessions: usize,
    pub(crate) max_connections: usize,
    pub(crate) notify_local_updates: bool,
    pub(crate) identity: Identity,
    pub(crate) reply_budget: usize,
    pub(crate) discovery: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            max_sessions: 64,
            max_connections: 128,
            notify_local_updates: true,
            identity: Identity::default(),
            reply_budget: UNCONNECTED_REPLY_BUDGET,
            discovery: true,
        }
    }
}

impl Options {
    /// transport connections and CIP connections idle longer than this are closed;
    /// `Duration::ZERO` keeps them open until the peer leaves
    #[inline]
    pub fn idle_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.idle_timeout = timeout;
        self
    }

    /// maximum number of registered sessions
    #[inline]
    pub fn max_sessions(&mut self, n: usize) -> &mut Self {
        self.max_sessions = n;
        self
    }

    /// maximum number of open CIP connections
    #[inline]
    pub fn max_connections(&mut self, n: usize) -> &mut Self {
        self.max_connections = n;
        self
    }

    /// emit events for local `update_tag` calls
    #[inline]
    pub fn notify_local_updates(&mut self, yes: bool) -> &mut Self {
        self.notify_local_updates = yes;
        self
    }

    /// identity object answered to ListIdentity
    #[inline]
    pub fn identity(&mut self, identity: Identity) -> &mut Self {
        self.identity = identity;
        self
    }

    /// product name of the identity object
    #[inline]
    pub fn product_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.identity.product_name = name.into();
        self
    }

    /// bytes of tag data in an unconnected ReadTag reply, at most 504
    #[inline]
    pub fn reply_budget(&mut self, n: usize) -> &mut Self {
        self.reply_budget = n.min(MAX_REPLY_BUDGET);
        self
    }

    /// answer ListIdentity/ListServices over UDP
    #[inline]
    pub fn discovery(&mut self, yes: bool) -> &mut Self {
        self.discovery = yes;
        self
    }

    /// idle timeout
    #[inline]
    pub fn get_idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// session limit
    #[inline]
    pub fn get_max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// connection limit
    #[inline]
    pub fn get_max_connections(&self) -> usize {
        self.max_connections
    }

    /// identity object
    #[inline]
    pub fn get_identity(&self) -> &Identity {
        &self.identity
    }

    /// idle limit, `None` when idle connections are kept
    #[inline]
    pub(crate) fn idle_limit(&self) -> Option<Duration> {
        if self.idle_timeout.is_zero() {
            None
        } else {
            Some(self.idle_timeout)
        }
    }

    /// how often the reaper looks for idle connections
    pub(crate) fn reap_interval(&self) -> Duration {
        let half = self.idle_timeout / 2;
        half.clamp(Duration::from_millis(10), Duration::from_secs(5))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reap_interval() {
        let mut opts = Options::default();
        assert_eq!(opts.reap_interval(), Duration::from_secs(5));
        opts.idle_timeout(Duration::from_millis(100));
        assert_eq!(opts.reap_interval(), Duration::from_millis(50));
        assert_eq!(opts.idle_limit(), Some(Duration::from_millis(100)));
        opts.idle_timeout(Duration::ZERO);
        assert_eq!(opts.idle_limit(), None);
    }

    #[test]
    fn test_reply_budget_clamped() {
        let mut opts = Options::default();
        opts.reply_budget(100);
        assert_eq!(opts.reply_budget, 100);
        opts.reply_budget(70_000);
        assert_eq!(opts.reply_budget, MAX_REPLY_BUDGET);
    }
}
