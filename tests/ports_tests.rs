use host_recon::ports::{load_ports_from_path, parse_ports_str};

#[test]
fn parse_single_and_ranges_and_comments() {
    let input = r#"
        # common ports
        22
        80  # http
        443 # https
        8000-8002
        8001  # duplicate
        # blank line follows

    "#;

    let ports = parse_ports_str(input).expect("parse ok");
    // Dedup, preserve insertion order of first appearance in each range/line
    assert_eq!(ports, vec![22, 80, 443, 8000, 8001, 8002]);
}

#[test]
fn invalid_port_rejected() {
    let input = "0\n"; // invalid: out of range
    assert!(parse_ports_str(input).is_err());
}

#[test]
fn ports_file_round_trip() {
    let path = std::env::temp_dir().join(format!("host-recon-ports-{}.txt", std::process::id()));
    std::fs::write(&path, "21,22\n80-81 # web\n").unwrap();
    let ports = load_ports_from_path(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(ports, vec![21, 22, 80, 81]);
}

#[test]
fn missing_ports_file_errors() {
    assert!(load_ports_from_path("/nonexistent/host-recon/ports.txt").is_err());
}
