use std::sync::atomic::{AtomicUsize, Ordering};

use rand::seq::SliceRandom;

use crate::config::{Host, HostSelectionPolicy};

/// Decides the order hosts are tried in on each (re)connect.
#[derive(Debug)]
pub struct HostSelector {
    hosts: Vec<Host>,
    policy: HostSelectionPolicy,
    next: AtomicUsize,
}

impl HostSelector {
    pub fn new(hosts: Vec<Host>, policy: HostSelectionPolicy) -> Self {
        Self {
            hosts,
            policy,
            next: AtomicUsize::new(0),
        }
    }

    /// Every host once. Round robin starts one host further along on each call.
    pub fn order(&self) -> Vec<Host> {
        let mut hosts = self.hosts.clone();
        if hosts.len() < 2 {
            return hosts;
        }
        match self.policy {
            HostSelectionPolicy::RoundRobin => {
                let start = self.next.fetch_add(1, Ordering::Relaxed) % hosts.len();
                hosts.rotate_left(start);
            }
            HostSelectionPolicy::Random => hosts.shuffle(&mut rand::thread_rng()),
        }
        hosts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts() -> Vec<Host> {
        vec![Host::new("a", 1), Host::new("b", 2), Host::new("c", 3)]
    }

    fn names(hosts: &[Host]) -> Vec<&str> {
        hosts.iter().map(|h| h.host.as_str()).collect()
    }

    #[test]
    fn round_robin_rotates_start() {
        let selector = HostSelector::new(hosts(), HostSelectionPolicy::RoundRobin);
        assert_eq!(names(&selector.order()), ["a", "b", "c"]);
        assert_eq!(names(&selector.order()), ["b", "c", "a"]);
        assert_eq!(names(&selector.order()), ["c", "a", "b"]);
        assert_eq!(names(&selector.order()), ["a", "b", "c"]);
    }

    #[test]
    fn random_is_a_permutation() {
        let selector = HostSelector::new(hosts(), HostSelectionPolicy::Random);
        for _ in 0..20 {
            let mut order = selector.order();
            order.sort_by(|a, b| a.host.cmp(&b.host));
            assert_eq!(order, hosts());
        }
    }

    #[test]
    fn single_host() {
        let selector = HostSelector::new(vec![Host::default()], HostSelectionPolicy::RoundRobin);
        assert_eq!(selector.order(), vec![Host::default()]);
        assert_eq!(selector.order(), vec![Host::default()]);
    }
}
