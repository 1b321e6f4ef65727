//! Capability policy encoding
//!
//! Maps a declarative `CapabilityConfig` onto the permission flags understood
//! by the runtime launcher. Encoding is total and side-effect free.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const ALLOW_NET_FLAG: &str = "--allow-net";
pub const ALLOW_READ_FLAG: &str = "--allow-read";
pub const ALLOW_ENV_FLAG: &str = "--allow-env";

/// Delimiter used to join allow-listed hosts into a single flag value
pub const HOST_DELIMITER: &str = ",";

/// Network access granted to one execution
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NetworkPolicy {
    /// No network flag is passed; the runtime denies all hosts
    Denied,
    /// Unrestricted network access
    #[default]
    AllAllowed,
    /// Access restricted to these hosts, in caller order, duplicates kept.
    /// An empty list behaves exactly like `Denied`.
    AllowList(Vec<String>),
}

impl NetworkPolicy {
    pub fn allow_list<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NetworkPolicy::AllowList(hosts.into_iter().map(Into::into).collect())
    }

    /// Whether any network access is granted
    pub fn is_denied(&self) -> bool {
        match self {
            NetworkPolicy::Denied => true,
            NetworkPolicy::AllAllowed => false,
            NetworkPolicy::AllowList(hosts) => hosts.is_empty(),
        }
    }

    fn flag(&self) -> Option<String> {
        match self {
            NetworkPolicy::AllAllowed => Some(ALLOW_NET_FLAG.to_string()),
            NetworkPolicy::AllowList(hosts) if !hosts.is_empty() => Some(format!(
                "{}={}",
                ALLOW_NET_FLAG,
                hosts.join(HOST_DELIMITER)
            )),
            NetworkPolicy::AllowList(_) | NetworkPolicy::Denied => None,
        }
    }
}

/// Wire form: `true`, `false` or a list of hosts
#[derive(Deserialize, Serialize)]
#[serde(untagged)]
enum RawNetworkPolicy {
    Toggle(bool),
    Hosts(Vec<String>),
}

impl<'de> Deserialize<'de> for NetworkPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawNetworkPolicy::deserialize(deserializer)? {
            RawNetworkPolicy::Toggle(true) => NetworkPolicy::AllAllowed,
            RawNetworkPolicy::Toggle(false) => NetworkPolicy::Denied,
            RawNetworkPolicy::Hosts(hosts) => NetworkPolicy::AllowList(hosts),
        })
    }
}

impl Serialize for NetworkPolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = match self {
            NetworkPolicy::Denied => RawNetworkPolicy::Toggle(false),
            NetworkPolicy::AllAllowed => RawNetworkPolicy::Toggle(true),
            NetworkPolicy::AllowList(hosts) => RawNetworkPolicy::Hosts(hosts.clone()),
        };
        raw.serialize(serializer)
    }
}

/// Permissions granted to one execution.
///
/// Defaults are permissive (all network, file reads) except for environment
/// access; callers needing a tighter sandbox must opt in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    #[serde(rename = "allow_net")]
    pub network: NetworkPolicy,
    #[serde(rename = "allow_read")]
    pub file_read: bool,
    #[serde(rename = "allow_env")]
    pub env_access: bool,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            network: NetworkPolicy::AllAllowed,
            file_read: true,
            env_access: false,
        }
    }
}

impl CapabilityConfig {
    /// Everything off: no network, no reads, no environment
    pub fn locked_down() -> Self {
        Self {
            network: NetworkPolicy::Denied,
            file_read: false,
            env_access: false,
        }
    }

    pub fn with_network(mut self, network: NetworkPolicy) -> Self {
        self.network = network;
        self
    }

    pub fn deny_network(self) -> Self {
        self.with_network(NetworkPolicy::Denied)
    }

    pub fn allow_hosts<I, S>(self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_network(NetworkPolicy::allow_list(hosts))
    }

    pub fn with_file_read(mut self, allow: bool) -> Self {
        self.file_read = allow;
        self
    }

    pub fn with_env_access(mut self, allow: bool) -> Self {
        self.env_access = allow;
        self
    }
}

/// Encode capabilities as launcher flags, in the order network, read, env
pub fn encode_flags(caps: &CapabilityConfig) -> Vec<String> {
    let mut flags = Vec::with_capacity(3);

    if let Some(net) = caps.network.flag() {
        flags.push(net);
    }
    if caps.file_read {
        flags.push(ALLOW_READ_FLAG.to_string());
    }
    if caps.env_access {
        flags.push(ALLOW_ENV_FLAG.to_string());
    }

    flags
}
