use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::process::Command;
use std::thread;

fn binary_output(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_cvsconn"))
        .args(args)
        .env_remove("CVS_PROXY")
        .output()
        .unwrap_or_else(|error| panic!("failed to run cvsconn: {error}"))
}

#[test]
fn help_lists_subcommands() {
    let output = binary_output(&["--help"]);
    assert!(output.status.success(), "--help should succeed");
    assert!(output.stderr.is_empty(), "help output should not write to stderr");
    let stdout = String::from_utf8(output.stdout).expect("stdout is UTF-8");
    assert!(stdout.contains("Usage:"));
    for subcommand in ["validate", "parse", "login", "logout"] {
        assert!(stdout.contains(subcommand), "missing {subcommand}");
    }
}

#[test]
fn invalid_location_exits_with_usage_status() {
    let output = binary_output(&["validate", ":pserver:host:/cvsroot "]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).expect("stderr is UTF-8");
    assert!(stderr.contains("must not end with whitespace"), "{stderr}");
}

#[test]
fn rejected_login_without_a_terminal_ends_silently() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub pserver");
    let port = listener.local_addr().expect("stub addr").port();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept client");
        let mut reader = BufReader::new(stream);
        for _ in 0..5 {
            let mut line = Vec::new();
            reader.read_until(b'\n', &mut line).expect("read request line");
        }
        let mut stream = reader.into_inner();
        stream
            .write_all(b"E bad password\nI HATE YOU\n")
            .expect("reply");
    });

    let dir = tempfile::tempdir().expect("tempdir");
    let store = dir.path().join("credentials.json");
    std::fs::write(
        &store,
        format!(
            r#"{{"version":1,"entries":[{{"realm":"cvsconn","location":":pserver:127.0.0.1#{port}:/cvsroot","username":"alice","password":"A"}}]}}"#
        ),
    )
    .expect("seed store");

    let output = binary_output(&[
        "--store",
        store.to_str().expect("utf-8 path"),
        "--timeout",
        "5",
        "login",
        &format!(":pserver:127.0.0.1#{port}:/cvsroot"),
    ]);
    server.join().expect("stub thread");

    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    assert!(output.stderr.is_empty(), "{}", String::from_utf8_lossy(&output.stderr));
}
