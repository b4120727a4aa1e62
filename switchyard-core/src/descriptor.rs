//! Endpoint descriptors.
//!
//! A [`Descriptor`] is either a single [`Target`] or a [`Group`] of descriptors
//! with a selection policy. Descriptors are validated when they are built and
//! never change afterwards, so one tree can be shared by any number of
//! concurrent calls.
//!
//! ```rust
//! use switchyard_core::{Descriptor, Group, ProtocolSet, Target};
//! use std::time::Duration;
//!
//! let protocols = ProtocolSet::default();
//! let primary = Target::builder("https://primary.example.com/api")
//!     .read_timeout(Duration::from_secs(5))
//!     .build(&protocols)
//!     .unwrap();
//! let replicas = Group::random(vec![
//!     Target::parse("https://replica-1.example.com/api", &protocols).unwrap().into(),
//!     Target::parse("https://replica-2.example.com/api", &protocols).unwrap().into(),
//! ])
//! .unwrap();
//!
//! let descriptor: Descriptor = Group::ordered(vec![primary.into(), replicas.into()])
//!     .unwrap()
//!     .into();
//! assert_eq!(descriptor.len(), 3);
//! ```

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::error::{DispatchError, Result};

/// Schemes a descriptor may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSet {
    schemes: BTreeSet<String>,
}

impl ProtocolSet {
    /// Create an allow-list from scheme names (case-insensitive).
    pub fn new<I, S>(schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            schemes: schemes
                .into_iter()
                .map(|s| s.as_ref().trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Allow an additional scheme.
    pub fn with(mut self, scheme: impl AsRef<str>) -> Self {
        self.schemes.insert(scheme.as_ref().to_ascii_lowercase());
        self
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.schemes.contains(&scheme.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.schemes.iter().map(String::as_str)
    }
}

impl Default for ProtocolSet {
    fn default() -> Self {
        Self::new(["http", "https"])
    }
}

/// Order in which a group's members are attempted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selection {
    /// Members are tried in the order they were listed.
    #[default]
    Ordered,
    /// Members are tried in a uniformly random order, drawn once per call.
    Random,
}

/// A single network endpoint with its own timeout budget.
///
/// Unset timeouts inherit the call configuration's defaults.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    url: Url,
    total_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
}

impl Target {
    /// Start building a target for `address`.
    pub fn builder(address: impl Into<String>) -> TargetBuilder {
        TargetBuilder::new(address)
    }

    /// Parse a target with every timeout left unset.
    pub fn parse(address: &str, protocols: &ProtocolSet) -> Result<Self> {
        TargetBuilder::new(address).build(protocols)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The normalized address.
    pub fn address(&self) -> &str {
        self.url.as_str()
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn total_timeout(&self) -> Option<Duration> {
        self.total_timeout
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Builder for [`Target`].
#[derive(Debug, Clone)]
pub struct TargetBuilder {
    address: String,
    total_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    invalid: Option<(&'static str, i64)>,
}

impl TargetBuilder {
    fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            total_timeout: None,
            connect_timeout: None,
            read_timeout: None,
            invalid: None,
        }
    }

    /// Set the total time budget for one attempt.
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = Some(timeout);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the total timeout in milliseconds. Negative values fail at `build`.
    pub fn total_timeout_ms(mut self, millis: i64) -> Self {
        self.total_timeout = self.checked_ms("total", millis);
        self
    }

    /// Set the connection timeout in milliseconds. Negative values fail at `build`.
    pub fn connect_timeout_ms(mut self, millis: i64) -> Self {
        self.connect_timeout = self.checked_ms("connect", millis);
        self
    }

    /// Set the read timeout in milliseconds. Negative values fail at `build`.
    pub fn read_timeout_ms(mut self, millis: i64) -> Self {
        self.read_timeout = self.checked_ms("read", millis);
        self
    }

    fn checked_ms(&mut self, name: &'static str, millis: i64) -> Option<Duration> {
        match u64::try_from(millis) {
            Ok(millis) => Some(Duration::from_millis(millis)),
            Err(_) => {
                self.invalid.get_or_insert((name, millis));
                None
            }
        }
    }

    /// Validate the address and timeouts.
    ///
    /// No network access happens here; only syntax and scheme are checked.
    pub fn build(self, protocols: &ProtocolSet) -> Result<Target> {
        if let Some((name, value)) = self.invalid {
            return Err(DispatchError::InvalidTimeout { name, value });
        }

        let url = Url::parse(self.address.trim()).map_err(|e| DispatchError::InvalidAddress {
            address: self.address.clone(),
            reason: e.to_string(),
        })?;

        if !protocols.contains(url.scheme()) {
            return Err(DispatchError::UnsupportedProtocol {
                scheme: url.scheme().to_string(),
                address: self.address,
            });
        }

        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(DispatchError::InvalidAddress {
                address: self.address,
                reason: "address has no host".to_string(),
            });
        }

        Ok(Target {
            url,
            total_timeout: self.total_timeout,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
        })
    }
}

/// A non-empty collection of descriptors tried for failover.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Group {
    selection: Selection,
    members: Vec<Descriptor>,
}

impl Group {
    /// Create a group; fails if `members` is empty.
    pub fn new(selection: Selection, members: Vec<Descriptor>) -> Result<Self> {
        if members.is_empty() {
            return Err(DispatchError::EmptyGroup);
        }
        Ok(Self { selection, members })
    }

    /// Members attempted in listed order.
    pub fn ordered(members: Vec<Descriptor>) -> Result<Self> {
        Self::new(Selection::Ordered, members)
    }

    /// Members attempted in a random order drawn once per call.
    pub fn random(members: Vec<Descriptor>) -> Result<Self> {
        Self::new(Selection::Random, members)
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn members(&self) -> &[Descriptor] {
        &self.members
    }
}

/// Description of where a call may go.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Descriptor {
    /// A single endpoint.
    Target(Target),
    /// An ordered or random collection of descriptors.
    Group(Group),
}

impl Descriptor {
    /// Every target in declaration order.
    pub fn targets(&self) -> Vec<&Target> {
        let mut out = Vec::new();
        self.collect_declared(&mut out);
        out
    }

    fn collect_declared<'a>(&'a self, out: &mut Vec<&'a Target>) {
        match self {
            Descriptor::Target(target) => out.push(target),
            Descriptor::Group(group) => {
                for member in &group.members {
                    member.collect_declared(out);
                }
            }
        }
    }

    /// Number of targets in the tree.
    pub fn len(&self) -> usize {
        match self {
            Descriptor::Target(_) => 1,
            Descriptor::Group(group) => group.members.iter().map(Descriptor::len).sum(),
        }
    }

    /// Descriptors always hold at least one target.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Flatten the tree into the attempt order for one call.
    ///
    /// Depth-first and left-to-right; every random group is permuted exactly
    /// once, so each target appears exactly once in the plan.
    pub fn plan<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<&Target> {
        let mut out = Vec::with_capacity(self.len());
        self.collect_planned(rng, &mut out);
        out
    }

    fn collect_planned<'a, R: Rng + ?Sized>(&'a self, rng: &mut R, out: &mut Vec<&'a Target>) {
        match self {
            Descriptor::Target(target) => out.push(target),
            Descriptor::Group(group) => match group.selection {
                Selection::Ordered => {
                    for member in &group.members {
                        member.collect_planned(rng, out);
                    }
                }
                Selection::Random => {
                    let mut order: Vec<&Descriptor> = group.members.iter().collect();
                    order.shuffle(rng);
                    for member in order {
                        member.collect_planned(rng, out);
                    }
                }
            },
        }
    }
}

impl From<Target> for Descriptor {
    fn from(target: Target) -> Self {
        Descriptor::Target(target)
    }
}

impl From<Group> for Descriptor {
    fn from(group: Group) -> Self {
        Descriptor::Group(group)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Target(target) => write!(f, "{}", target),
            Descriptor::Group(group) => {
                let label = match group.selection {
                    Selection::Ordered => "ordered",
                    Selection::Random => "random",
                };
                write!(f, "{}[", label)?;
                for (i, member) in group.members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", member)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Declarative form of a descriptor tree, as found in settings files.
///
/// ```toml
/// [endpoints]
/// selection = "ordered"
///
/// [[endpoints.members]]
/// address = "https://primary.example.com"
/// read_timeout_ms = 2000
///
/// [[endpoints.members]]
/// selection = "random"
/// members = [
///     { address = "https://replica-1.example.com" },
///     { address = "https://replica-2.example.com" },
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DescriptorSpec {
    Target {
        address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_timeout_ms: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        connect_timeout_ms: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        read_timeout_ms: Option<i64>,
    },
    Group {
        #[serde(default)]
        selection: Selection,
        members: Vec<DescriptorSpec>,
    },
}

impl DescriptorSpec {
    /// Validate and build the descriptor tree.
    pub fn build(&self, protocols: &ProtocolSet) -> Result<Descriptor> {
        match self {
            DescriptorSpec::Target {
                address,
                total_timeout_ms,
                connect_timeout_ms,
                read_timeout_ms,
            } => {
                let mut builder = Target::builder(address.clone());
                if let Some(ms) = total_timeout_ms {
                    builder = builder.total_timeout_ms(*ms);
                }
                if let Some(ms) = connect_timeout_ms {
                    builder = builder.connect_timeout_ms(*ms);
                }
                if let Some(ms) = read_timeout_ms {
                    builder = builder.read_timeout_ms(*ms);
                }
                Ok(builder.build(protocols)?.into())
            }
            DescriptorSpec::Group { selection, members } => {
                let members = members
                    .iter()
                    .map(|member| member.build(protocols))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Group::new(*selection, members)?.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn target(address: &str) -> Descriptor {
        Target::parse(address, &ProtocolSet::default()).unwrap().into()
    }

    #[test]
    fn test_structural_equality() {
        let protocols = ProtocolSet::default();
        let a = Target::builder("http://svc.example/rpc")
            .read_timeout_ms(250)
            .build(&protocols)
            .unwrap();
        let b = Target::builder("http://svc.example/rpc")
            .read_timeout(Duration::from_millis(250))
            .build(&protocols)
            .unwrap();
        let c = Target::builder("http://svc.example/rpc")
            .read_timeout_ms(500)
            .build(&protocols)
            .unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_unsupported_scheme_rejected() {
        let protocols = ProtocolSet::new(["http", "https"]);
        let err = Target::parse("ftp://files.example/data", &protocols).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::UnsupportedProtocol { ref scheme, .. } if scheme == "ftp"
        ));
    }

    #[test]
    fn test_scheme_allow_list_is_case_insensitive() {
        let protocols = ProtocolSet::new(["HTTP"]);
        assert!(Target::parse("http://svc.example", &protocols).is_ok());
        assert!(protocols.contains("Http"));
    }

    #[test]
    fn test_invalid_address_rejected() {
        let err = Target::parse("not a url", &ProtocolSet::default()).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidAddress { .. }));
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let err = Target::builder("http://svc.example")
            .connect_timeout_ms(-5)
            .build(&ProtocolSet::default())
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidTimeout { name: "connect", value: -5 }
        ));
    }

    #[test]
    fn test_unset_timeouts_inherit() {
        let t = Target::parse("http://svc.example", &ProtocolSet::default()).unwrap();
        assert_eq!(t.total_timeout(), None);
        assert_eq!(t.connect_timeout(), None);
        assert_eq!(t.read_timeout(), None);
    }

    #[test]
    fn test_empty_group_rejected() {
        assert!(matches!(Group::ordered(vec![]), Err(DispatchError::EmptyGroup)));
        assert!(matches!(Group::random(vec![]), Err(DispatchError::EmptyGroup)));
    }

    #[test]
    fn test_ordered_plan_is_depth_first() {
        let inner = Group::ordered(vec![target("http://b.example"), target("http://c.example")])
            .unwrap();
        let tree: Descriptor =
            Group::ordered(vec![target("http://a.example"), inner.into(), target("http://d.example")])
                .unwrap()
                .into();

        let mut rng = StdRng::seed_from_u64(7);
        let hosts: Vec<_> = tree
            .plan(&mut rng)
            .iter()
            .map(|t| t.url().host_str().unwrap())
            .collect();
        assert_eq!(hosts, vec!["a.example", "b.example", "c.example", "d.example"]);
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_random_plan_visits_every_target_once() {
        let members: Vec<_> = (0..6)
            .map(|i| target(&format!("http://node-{}.example", i)))
            .collect();
        let tree: Descriptor = Group::random(members).unwrap().into();

        let mut rng = StdRng::seed_from_u64(42);
        let mut orders = BTreeSet::new();
        for _ in 0..20 {
            let mut plan: Vec<_> = tree.plan(&mut rng).iter().map(|t| t.address().to_string()).collect();
            orders.insert(plan.clone());
            plan.sort();
            plan.dedup();
            assert_eq!(plan.len(), 6);
        }
        assert!(orders.len() > 1, "random selection should vary across calls");
    }

    #[test]
    fn test_display() {
        let tree: Descriptor = Group::random(vec![target("http://a.example"), target("http://b.example")])
            .unwrap()
            .into();
        assert_eq!(tree.to_string(), "random[http://a.example/, http://b.example/]");
    }

    #[test]
    fn test_spec_from_json() {
        let spec: DescriptorSpec = serde_json::from_str(
            r#"{
                "selection": "ordered",
                "members": [
                    { "address": "https://primary.example", "read_timeout_ms": 100 },
                    { "selection": "random", "members": [
                        { "address": "https://r1.example" },
                        { "address": "https://r2.example" }
                    ]}
                ]
            }"#,
        )
        .unwrap();

        let tree = spec.build(&ProtocolSet::default()).unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.targets()[0].read_timeout(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_spec_rejects_empty_group() {
        let spec: DescriptorSpec = serde_json::from_str(r#"{ "members": [] }"#).unwrap();
        assert!(matches!(
            spec.build(&ProtocolSet::default()),
            Err(DispatchError::EmptyGroup)
        ));
    }
}
