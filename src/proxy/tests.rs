#![allow(clippy::unwrap_used)]

use super::*;

fn fields(pairs: &[(&str, &str)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn gitea() -> HttpProxy {
    HttpProxy {
        host: "gitea.example.com".into(),
        local_ip: "gitea.default.svc.cluster.local".into(),
        local_port: Some(3000),
        locations: "/".into(),
        ..Default::default()
    }
}

fn tls() -> Tls {
    Tls {
        crt_base64: "Y2VydA==".into(),
        key_base64: "a2V5".into(),
    }
}

#[test]
fn test_http_fields() {
    let mut p = gitea();
    p.group = Some(Group {
        id: "g1".into(),
        key: "secret".into(),
    });
    p.host_header_rewrite = Some("gitea.internal".into());
    p.basic_auth = Some(BasicAuth {
        user: "user".into(),
        password: "pwd".into(),
    });

    assert_eq!(
        Entry::from(p).fields(),
        fields(&[
            ("type", "http"),
            ("custom_domains", "gitea.example.com"),
            ("local_ip", "gitea.default.svc.cluster.local"),
            ("local_port", "3000"),
            ("locations", "/"),
            ("group", "g1"),
            ("group_key", "secret"),
            ("host_header_rewrite", "gitea.internal"),
            ("http_user", "user"),
            ("http_pwd", "pwd"),
        ])
    );
}

#[test]
fn test_redirect_only() {
    let p = HttpProxy {
        redirect: Some("https://example.com".into()),
        ..Default::default()
    };
    assert_eq!(
        p.fields(),
        fields(&[("type", "http"), ("redirect", "https://example.com")])
    );
}

#[test]
fn test_https_plugin_fields() {
    let mut http = gitea();
    http.group = Some(Group::generate("default/gitea", "https"));

    let entry = Entry::from(HttpsPluginProxy { http, tls: tls() });

    assert_eq!(
        entry.fields(),
        fields(&[
            ("type", "https"),
            ("custom_domains", "gitea.example.com"),
            ("locations", "/"),
            ("plugin", "https2http"),
            ("plugin_local_addr", "gitea.default.svc.cluster.local:3000"),
            ("plugin_crt_base64", "Y2VydA=="),
            ("plugin_key_base64", "a2V5"),
        ])
    );
    assert!(!entry.is_groupable());
}

#[test]
fn test_plugin_local_addr_without_port() {
    let mut http = gitea();
    http.local_port = None;
    let fields = HttpsPluginProxy { http, tls: tls() }.fields();
    assert_eq!(
        fields.get(keys::PLUGIN_LOCAL_ADDR).map(String::as_str),
        Some("gitea.default.svc.cluster.local")
    );
}

#[test]
fn test_server_https_fields() {
    let mut http = gitea();
    http.group = Some(Group {
        id: "g1".into(),
        key: "secret".into(),
    });

    let entry = Entry::from(ServerHttpsProxy { http, tls: tls() });
    let m = entry.fields();
    assert_eq!(m.get("type").map(String::as_str), Some("server_https"));
    assert_eq!(m.get("tls_crts").map(String::as_str), Some("Y2VydA=="));
    assert_eq!(m.get("tls_keys").map(String::as_str), Some("a2V5"));
    assert_eq!(m.get("group").map(String::as_str), Some("g1"));
    assert!(entry.is_groupable());
}

#[test]
fn test_server_https_passthrough_fields() {
    let mut http = gitea();
    http.group = Some(Group {
        id: "g1".into(),
        key: "secret".into(),
    });

    let entry = Entry::from(ServerHttpsPassthroughProxy { http, tls: tls() });
    let m = entry.fields();
    assert_eq!(m.get("type").map(String::as_str), Some("server_https"));
    assert_eq!(m.get("plugin").map(String::as_str), Some("http2https"));
    assert_eq!(
        m.get("plugin_local_addr").map(String::as_str),
        Some("gitea.default.svc.cluster.local:3000")
    );
    assert_eq!(m.get("group"), None);
    assert!(!entry.is_groupable());
}

#[test]
fn test_groupable() {
    let mut p = gitea();
    assert!(!Entry::from(p.clone()).is_groupable());

    p.group = Some(Group::default());
    assert!(!Entry::from(p.clone()).is_groupable(), "empty group id");

    p.group = Some(Group::generate("default/gitea/gitea", "http"));
    assert!(Entry::from(p).is_groupable());

    let raw = |kind| {
        Entry::from(fields(&[
            ("type", kind),
            ("local_port", "9443"),
            ("group", "kube-apiserver"),
        ]))
    };
    assert!(raw("tcp").is_groupable());
    assert!(raw("tcpmux").is_groupable());
    assert!(raw("http").is_groupable());
    assert!(!raw("udp").is_groupable());
    assert!(!raw("https").is_groupable());

    let ssh = Entry::from(fields(&[("type", "tcp"), ("local_port", "22")]));
    assert!(!ssh.is_groupable());
}

#[test]
fn test_equality_is_on_fields() {
    let typed = Entry::from(gitea());
    let raw = Entry::from(typed.fields());
    assert_eq!(typed, raw);

    let mut other = gitea();
    other.locations = "/api".into();
    assert_ne!(typed, Entry::from(other));

    let mut extra = typed.fields();
    extra.insert("remote_port".into(), "80".into());
    assert_ne!(typed, Entry::from(extra));
}

#[test]
fn test_display_redacts_secrets() {
    let mut http = gitea();
    http.group = Some(Group {
        id: "g1".into(),
        key: "group-secret".into(),
    });
    http.basic_auth = Some(BasicAuth {
        user: "user".into(),
        password: "hunter2".into(),
    });
    let entry = Entry::from(ServerHttpsProxy { http, tls: tls() });

    let s = entry.to_string();
    assert!(s.contains("custom_domains=gitea.example.com"));
    assert!(s.contains("tls_crts=<redacted>"));
    assert!(s.contains("tls_keys=<redacted>"));
    assert!(!s.contains("Y2VydA=="));
    assert!(!s.contains("group-secret"));
    assert!(!s.contains("hunter2"));

    assert!(!format!("{:?}", tls()).contains("a2V5"));
}

#[test]
fn test_group_generate() {
    let group = Group::generate("default/gitea-ingress/gitea", "http");
    assert_eq!(group.id.len(), 16);
    assert_eq!(group.key.len(), 64);
    assert!(group.key.starts_with(&group.id));

    assert_eq!(group, Group::generate("default/gitea-ingress/gitea", "http"));
    assert_ne!(group, Group::generate("default/gitea-ingress/gitea", "https"));
}

#[test]
fn test_tls_from_pem() {
    let tls = Tls::from_pem(b"cert", b"key");
    assert_eq!(tls.crt_base64, "Y2VydA==");
    assert_eq!(tls.key_base64, "a2V5");
}

#[test]
fn test_entry_from_yaml() {
    let entry: Entry = serde_yaml::from_str(
        r#"
http:
  host: gitea.example.com
  local_ip: 10.0.0.5
  local_port: 3000
  locations: /
  group: { id: g1, key: secret }
"#,
    )
    .unwrap();
    assert!(entry.is_groupable());
    assert_eq!(entry.fields().get("local_port").map(String::as_str), Some("3000"));

    let entry: Entry = serde_yaml::from_str(
        r#"
https_plugin:
  host: gitea.example.com
  local_ip: 127.0.0.1
  local_port: 3000
  tls: { crt_base64: Y2VydA==, key_base64: a2V5 }
"#,
    )
    .unwrap();
    assert_eq!(
        entry.fields().get("plugin_local_addr").map(String::as_str),
        Some("127.0.0.1:3000")
    );

    let entry: Entry = serde_yaml::from_str(
        r#"
raw:
  type: tcp
  local_ip: 127.0.0.1
  local_port: "22"
  remote_port: "6000"
"#,
    )
    .unwrap();
    assert_eq!(entry.fields().len(), 4);
}

#[test]
fn test_debug_redacts_secrets() {
    let mut http = gitea();
    http.group = Some(Group {
        id: "g1".into(),
        key: "group-secret".into(),
    });
    http.basic_auth = Some(BasicAuth {
        user: "user".into(),
        password: "hunter2".into(),
    });
    let debug = format!("{:?}", Entry::from(http));
    assert!(debug.contains("g1"));
    assert!(debug.contains("user"));
    assert!(!debug.contains("group-secret"));
    assert!(!debug.contains("hunter2"));

    let raw = Entry::from(fields(&[
        ("type", "server_https"),
        ("tls_keys", "a2V5"),
        ("http_pwd", "hunter2"),
    ]));
    let debug = format!("{raw:?}");
    assert!(debug.starts_with("Raw("));
    assert!(debug.contains("server_https"));
    assert!(!debug.contains("a2V5"));
    assert!(!debug.contains("hunter2"));

    let common = fields(&[("admin_user", "admin"), ("admin_pwd", "hunter2"), ("token", "t0k")]);
    let debug = format!("{:?}", Redacted(&common));
    assert!(debug.contains("admin"));
    assert!(!debug.contains("hunter2"));
    assert!(!debug.contains("t0k"));
}
