use std::collections::HashMap;

use prefix_proxy::config::{Config, MountConfig, QueryJoin};

#[test]
fn test_config_default_address() {
    let cfg = Config::from_yaml_str("mounts: []\n").unwrap();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
    assert!(cfg.mounts.is_empty());
}

#[test]
fn test_config_parses_mounts() {
    let yaml = r#"
server:
  listen_addr: "0.0.0.0:3000"
mounts:
  - target: "http://upstream.local/api"
    pathBase: "/proxy"
  - target: "http://search.local"
    pathBase: "/search"
    queryJoin: verbatim
"#;
    let cfg = Config::from_yaml_str(yaml).unwrap();

    assert_eq!(cfg.server.listen_addr, "0.0.0.0:3000");
    assert_eq!(cfg.mounts.len(), 2);
    assert_eq!(cfg.mounts[0], MountConfig::new("http://upstream.local/api", "/proxy"));
    assert_eq!(cfg.mounts[1].query_join, QueryJoin::Verbatim);
}

#[test]
fn test_config_ignores_unknown_mount_keys() {
    let yaml = r#"
mounts:
  - target: "http://upstream.local"
    pathBase: "/p"
    timeout: 30
    description: "ignored"
"#;
    let cfg = Config::from_yaml_str(yaml).unwrap();
    assert_eq!(cfg.mounts[0].target, "http://upstream.local");
    assert_eq!(cfg.mounts[0].path_base, "/p");
}

#[test]
fn test_config_rejects_unknown_query_join() {
    let yaml = "mounts:\n  - target: http://a\n    queryJoin: sometimes\n";
    assert!(Config::from_yaml_str(yaml).is_err());
}

#[test]
fn test_listen_override() {
    let mut cfg = Config::from_yaml_str("server:\n  listen_addr: 127.0.0.1:1\n").unwrap();

    cfg.apply_listen_override(None);
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:1");

    cfg.apply_listen_override(Some(String::new()));
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:1");

    cfg.apply_listen_override(Some("0.0.0.0:5000".to_string()));
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:5000");
}

#[test]
fn test_config_from_missing_file() {
    let err = Config::from_file("/nonexistent/prefix-proxy.yaml").unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
}

#[test]
fn test_config_from_file() {
    let path = std::env::temp_dir().join(format!("prefix-proxy-test-{}.yaml", std::process::id()));
    std::fs::write(&path, "mounts:\n  - target: http://a.local/x\n    pathBase: /a\n").unwrap();

    let cfg = Config::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(cfg.mounts, vec![MountConfig::new("http://a.local/x", "/a")]);
}

#[test]
fn test_mount_from_map() {
    let mut map = HashMap::new();
    map.insert("target".to_string(), "http://upstream.local/api".to_string());
    map.insert("pathBase".to_string(), "/proxy".to_string());
    map.insert("somethingElse".to_string(), "x".to_string());

    let mount = MountConfig::from_map(&map).unwrap();
    assert_eq!(mount, MountConfig::new("http://upstream.local/api", "/proxy"));
}

#[test]
fn test_mount_from_map_missing_keys() {
    let mount = MountConfig::from_map(&HashMap::new()).unwrap();
    assert_eq!(mount.target, "");
    assert_eq!(mount.path_base, "");
}

#[test]
fn test_mount_from_map_query_join() {
    let mut map = HashMap::new();
    map.insert("queryJoin".to_string(), "verbatim".to_string());
    assert_eq!(MountConfig::from_map(&map).unwrap().query_join, QueryJoin::Verbatim);

    map.insert("queryJoin".to_string(), "bogus".to_string());
    assert!(MountConfig::from_map(&map).is_err());
}
