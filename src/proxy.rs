use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap as Map;
use std::fmt;

#[cfg(test)]
mod tests;

/// Wire form of an entry: the `key=value` lines of one section.
pub type Fields = Map<String, String>;

pub mod keys {
    pub const TYPE: &str = "type";
    pub const LOCAL_IP: &str = "local_ip";
    pub const LOCAL_PORT: &str = "local_port";
    pub const CUSTOM_DOMAINS: &str = "custom_domains";
    pub const LOCATIONS: &str = "locations";
    pub const GROUP: &str = "group";
    pub const GROUP_KEY: &str = "group_key";
    pub const REDIRECT: &str = "redirect";
    pub const HOST_HEADER_REWRITE: &str = "host_header_rewrite";
    pub const HEADER_X_FROM_WHERE: &str = "header_X-From-Where";
    pub const HTTP_USER: &str = "http_user";
    pub const HTTP_PWD: &str = "http_pwd";
    pub const PLUGIN: &str = "plugin";
    pub const PLUGIN_LOCAL_ADDR: &str = "plugin_local_addr";
    pub const PLUGIN_CRT_BASE64: &str = "plugin_crt_base64";
    pub const PLUGIN_KEY_BASE64: &str = "plugin_key_base64";
    pub const TLS_CRTS: &str = "tls_crts";
    pub const TLS_KEYS: &str = "tls_keys";

    // common section
    pub const ADMIN_PWD: &str = "admin_pwd";
    pub const TOKEN: &str = "token";
}

pub mod kinds {
    pub const TCP: &str = "tcp";
    pub const HTTP: &str = "http";
    pub const TCPMUX: &str = "tcpmux";
    pub const HTTPS: &str = "https";
    pub const SERVER_HTTPS: &str = "server_https";

    pub const PLUGIN_HTTPS2HTTP: &str = "https2http";
    pub const PLUGIN_HTTP2HTTPS: &str = "http2https";
}

/// proxy kinds the server can load-balance with groups
const GROUPABLE_KINDS: [&str; 3] = [kinds::TCP, kinds::HTTP, kinds::TCPMUX];

/// values never written to logs
const SECRET_KEYS: [&str; 8] = [
    keys::PLUGIN_CRT_BASE64,
    keys::PLUGIN_KEY_BASE64,
    keys::TLS_CRTS,
    keys::TLS_KEYS,
    keys::GROUP_KEY,
    keys::HTTP_PWD,
    keys::ADMIN_PWD,
    keys::TOKEN,
];

pub const REDACTED: &str = "<redacted>";

/// One named route definition, as pushed to the fleet.
///
/// Equality is defined on the wire form: two entries are equal when their
/// [`Entry::fields`] are, whatever their variant.
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Entry {
    /// Section copied as-is, e.g. a hand-written tcp proxy or anything read
    /// back from a fleet member.
    Raw(Fields),
    Http(HttpProxy),
    /// https terminated by the server's `https2http` plugin.
    HttpsPlugin(HttpsPluginProxy),
    ServerHttps(ServerHttpsProxy),
    /// server side TLS forwarded to an upstream that speaks TLS itself.
    ServerHttpsPassthrough(ServerHttpsPassthroughProxy),
}

impl Entry {
    pub fn fields(&self) -> Fields {
        match self {
            Self::Raw(fields) => fields.clone(),
            Self::Http(p) => p.fields(),
            Self::HttpsPlugin(p) => p.fields(),
            Self::ServerHttps(p) => p.fields(),
            Self::ServerHttpsPassthrough(p) => p.fields(),
        }
    }

    /// Whether this entry uses server-side load-balancing groups, and so can
    /// be written to every member of the fleet.
    pub fn is_groupable(&self) -> bool {
        match self {
            Self::Raw(fields) => {
                let kind = fields.get(keys::TYPE).map(String::as_str);
                let has_group = fields.get(keys::GROUP).is_some_and(|g| !g.is_empty());
                has_group && kind.is_some_and(|kind| GROUPABLE_KINDS.contains(&kind))
            }
            Self::Http(p) => p.has_group(),
            Self::ServerHttps(p) => p.http.has_group(),
            Self::HttpsPlugin(_) | Self::ServerHttpsPassthrough(_) => false,
        }
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.fields() == other.fields()
    }
}
impl Eq for Entry {}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.fields();
        let pairs = (fields.iter()).map(|(k, v)| format!("{k}={}", redact(k, v)));
        write!(f, "{{{}}}", pairs.format(", "))
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(fields) => f.debug_tuple("Raw").field(&Redacted(fields)).finish(),
            Self::Http(p) => f.debug_tuple("Http").field(p).finish(),
            Self::HttpsPlugin(p) => f.debug_tuple("HttpsPlugin").field(p).finish(),
            Self::ServerHttps(p) => f.debug_tuple("ServerHttps").field(p).finish(),
            Self::ServerHttpsPassthrough(p) => {
                f.debug_tuple("ServerHttpsPassthrough").field(p).finish()
            }
        }
    }
}

/// Debug view of a field bag with secret values redacted.
pub struct Redacted<'t>(pub &'t Fields);

impl fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(k, v)| (k, redact(k, v))))
            .finish()
    }
}

fn redact<'t>(key: &str, value: &'t str) -> &'t str {
    if SECRET_KEYS.contains(&key) {
        REDACTED
    } else {
        value
    }
}

impl From<Fields> for Entry {
    fn from(fields: Fields) -> Self {
        Self::Raw(fields)
    }
}
impl From<HttpProxy> for Entry {
    fn from(p: HttpProxy) -> Self {
        Self::Http(p)
    }
}
impl From<HttpsPluginProxy> for Entry {
    fn from(p: HttpsPluginProxy) -> Self {
        Self::HttpsPlugin(p)
    }
}
impl From<ServerHttpsProxy> for Entry {
    fn from(p: ServerHttpsProxy) -> Self {
        Self::ServerHttps(p)
    }
}
impl From<ServerHttpsPassthroughProxy> for Entry {
    fn from(p: ServerHttpsPassthroughProxy) -> Self {
        Self::ServerHttpsPassthrough(p)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct HttpProxy {
    /// public host name (custom domain)
    pub host: String,
    /// upstream address
    #[serde(default)]
    pub local_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_port: Option<u16>,
    /// path prefix
    #[serde(default)]
    pub locations: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<Group>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_header_rewrite: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_x_from_where: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuth>,
}

impl HttpProxy {
    pub fn fields(&self) -> Fields {
        let mut m = Fields::new();
        m.insert(keys::TYPE.into(), kinds::HTTP.into());

        put(&mut m, keys::CUSTOM_DOMAINS, &self.host);
        put(&mut m, keys::LOCAL_IP, &self.local_ip);
        if let Some(port) = self.local_port {
            m.insert(keys::LOCAL_PORT.into(), port.to_string());
        }
        put(&mut m, keys::LOCATIONS, &self.locations);

        if let Some(group) = &self.group {
            put(&mut m, keys::GROUP, &group.id);
            put(&mut m, keys::GROUP_KEY, &group.key);
        }

        put_opt(&mut m, keys::REDIRECT, &self.redirect);
        put_opt(&mut m, keys::HOST_HEADER_REWRITE, &self.host_header_rewrite);
        put_opt(&mut m, keys::HEADER_X_FROM_WHERE, &self.header_x_from_where);

        if let Some(auth) = &self.basic_auth {
            put(&mut m, keys::HTTP_USER, &auth.user);
            put(&mut m, keys::HTTP_PWD, &auth.password);
        }

        m
    }

    fn has_group(&self) -> bool {
        self.group.as_ref().is_some_and(|g| !g.id.is_empty())
    }

    /// `ip:port`, or just `ip` when no port is set.
    fn plugin_local_addr(&self) -> Option<String> {
        if self.local_ip.is_empty() {
            return None;
        }
        Some(match self.local_port {
            Some(port) => format!("{}:{port}", self.local_ip),
            None => self.local_ip.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HttpsPluginProxy {
    #[serde(flatten)]
    pub http: HttpProxy,
    pub tls: Tls,
}

impl HttpsPluginProxy {
    pub fn fields(&self) -> Fields {
        let mut m = self.http.fields();

        // the plugin owns the upstream, and plugin proxies are never grouped
        for key in [keys::LOCAL_IP, keys::LOCAL_PORT, keys::GROUP, keys::GROUP_KEY] {
            m.remove(key);
        }

        m.insert(keys::TYPE.into(), kinds::HTTPS.into());
        m.insert(keys::PLUGIN.into(), kinds::PLUGIN_HTTPS2HTTP.into());
        if let Some(addr) = self.http.plugin_local_addr() {
            m.insert(keys::PLUGIN_LOCAL_ADDR.into(), addr);
        }
        put(&mut m, keys::PLUGIN_CRT_BASE64, &self.tls.crt_base64);
        put(&mut m, keys::PLUGIN_KEY_BASE64, &self.tls.key_base64);
        m
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerHttpsProxy {
    #[serde(flatten)]
    pub http: HttpProxy,
    pub tls: Tls,
}

impl ServerHttpsProxy {
    pub fn fields(&self) -> Fields {
        let mut m = self.http.fields();
        m.insert(keys::TYPE.into(), kinds::SERVER_HTTPS.into());
        put(&mut m, keys::TLS_CRTS, &self.tls.crt_base64);
        put(&mut m, keys::TLS_KEYS, &self.tls.key_base64);
        m
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerHttpsPassthroughProxy {
    #[serde(flatten)]
    pub http: HttpProxy,
    pub tls: Tls,
}

impl ServerHttpsPassthroughProxy {
    pub fn fields(&self) -> Fields {
        let mut m = self.http.fields();
        m.remove(keys::GROUP);
        m.remove(keys::GROUP_KEY);

        m.insert(keys::TYPE.into(), kinds::SERVER_HTTPS.into());
        m.insert(keys::PLUGIN.into(), kinds::PLUGIN_HTTP2HTTPS.into());
        if let Some(addr) = self.http.plugin_local_addr() {
            m.insert(keys::PLUGIN_LOCAL_ADDR.into(), addr);
        }
        put(&mut m, keys::TLS_CRTS, &self.tls.crt_base64);
        put(&mut m, keys::TLS_KEYS, &self.tls.key_base64);
        m
    }
}

/// Server-side load-balancing group.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Group {
    pub id: String,
    pub key: String,
}

impl Group {
    /// Derive a stable group from a route name and a proxy kind, so the same
    /// route always lands in the same group without persisted state.
    pub fn generate(name: &str, kind: &str) -> Self {
        let digest = Sha256::digest(format!("{name}/{kind}").as_bytes());
        Self {
            id: hex::encode(&digest[..8]),
            key: hex::encode(digest),
        }
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("id", &self.id)
            .field("key", &REDACTED)
            .finish()
    }
}

#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BasicAuth {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("password", &REDACTED)
            .finish()
    }
}

/// Certificate and private key, base64-encoded PEM.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Tls {
    pub crt_base64: String,
    pub key_base64: String,
}

impl Tls {
    pub fn from_pem(crt: &[u8], key: &[u8]) -> Self {
        Self {
            crt_base64: BASE64.encode(crt),
            key_base64: BASE64.encode(key),
        }
    }
}

impl fmt::Debug for Tls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tls")
            .field("crt_base64", &REDACTED)
            .field("key_base64", &REDACTED)
            .finish()
    }
}

fn put(m: &mut Fields, key: &str, value: &str) {
    if !value.is_empty() {
        m.insert(key.into(), value.into());
    }
}

fn put_opt(m: &mut Fields, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        put(m, key, value);
    }
}
