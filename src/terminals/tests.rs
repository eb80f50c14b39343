use super::*;
use crate::pty_session::ShellCommand;
use crossbeam_channel::{unbounded, Receiver};
use std::time::{Duration, Instant};

fn defaults(max_terminals: usize) -> TerminalDefaults {
    TerminalDefaults {
        shell: ShellCommand::parse("/bin/sh").unwrap(),
        term: "xterm-256color".to_string(),
        cwd: std::env::temp_dir(),
        cols: 80,
        rows: 24,
        max_terminals,
    }
}

fn registry(max_terminals: usize) -> (TerminalRegistry, Receiver<TerminalEvent>) {
    let (tx, rx) = unbounded();
    (TerminalRegistry::new(defaults(max_terminals), tx), rx)
}

/// Feed events into the registry until `done` is satisfied by the collected notices.
fn pump_until(
    registry: &mut TerminalRegistry,
    rx: &Receiver<TerminalEvent>,
    timeout: Duration,
    done: impl Fn(&[TerminalNotice]) -> bool,
) -> Vec<TerminalNotice> {
    let deadline = Instant::now() + timeout;
    let mut notices = Vec::new();
    while Instant::now() < deadline {
        if let Ok(event) = rx.recv_timeout(Duration::from_millis(50)) {
            notices.extend(registry.handle_event(event));
            if done(&notices) {
                break;
            }
        }
    }
    notices
}

fn output_for(notices: &[TerminalNotice], want: TermId) -> String {
    notices
        .iter()
        .filter_map(|notice| match notice {
            TerminalNotice::Output { id, data } if *id == want => Some(data.as_str()),
            _ => None,
        })
        .collect()
}

fn exits_for(notices: &[TerminalNotice], want: TermId) -> usize {
    notices
        .iter()
        .filter(|notice| matches!(notice, TerminalNotice::Exit { id, .. } if *id == want))
        .count()
}

#[test]
fn ids_are_positive_and_strictly_increasing() {
    let (mut registry, _rx) = registry(8);
    let mut last = 0;
    for _ in 0..3 {
        let id = registry.create(&CreateRequest::default()).unwrap();
        assert!(id > last);
        last = id;
    }
    assert_eq!(registry.active_ids(), vec![1, 2, 3]);
    registry.close_all();
}

#[test]
fn ids_are_not_reused_after_close() {
    let (mut registry, _rx) = registry(8);
    let first = registry.create(&CreateRequest::default()).unwrap();
    registry.close(first);
    let second = registry.create(&CreateRequest::default()).unwrap();
    assert!(second > first);
    registry.close_all();
}

#[test]
fn output_streams_back_for_input() {
    let (mut registry, rx) = registry(4);
    let id = registry.create(&CreateRequest::default()).unwrap();
    registry.write(id, "echo hello-$((6*7))\n");
    let notices = pump_until(&mut registry, &rx, Duration::from_secs(5), |n| {
        output_for(n, id).contains("hello-42")
    });
    assert!(output_for(&notices, id).contains("hello-42"));
    registry.close_all();
}

#[test]
fn create_uses_requested_geometry_and_cwd() {
    let dir = tempfile::tempdir().unwrap();
    let canonical = dir.path().canonicalize().unwrap();
    let (mut registry, rx) = registry(4);
    let id = registry
        .create(&CreateRequest {
            cols: Some(120),
            rows: Some(40),
            cwd: Some(canonical.display().to_string()),
        })
        .unwrap();
    assert_eq!(registry.dimensions(id), Some((120, 40)));
    registry.write(id, "stty size; pwd\n");
    let want = canonical.display().to_string();
    let notices = pump_until(&mut registry, &rx, Duration::from_secs(5), |n| {
        let out = output_for(n, id);
        out.contains("40 120") && out.contains(&want)
    });
    let out = output_for(&notices, id);
    assert!(out.contains("40 120"), "output: {out:?}");
    assert!(out.contains(&want), "output: {out:?}");
    registry.close_all();
}

#[test]
fn resize_clamps_and_applies() {
    let (mut registry, _rx) = registry(4);
    let id = registry.create(&CreateRequest::default()).unwrap();
    registry.resize(id, 0, 5000);
    assert_eq!(registry.dimensions(id), Some((1, 1000)));
    registry.resize(id, 100, 30);
    assert_eq!(registry.dimensions(id), Some((100, 30)));
    registry.close_all();
}

#[test]
fn close_produces_exactly_one_exit() {
    let (mut registry, rx) = registry(4);
    let id = registry.create(&CreateRequest::default()).unwrap();
    registry.close(id);
    assert!(!registry.is_active(id));
    // Let the reader's EOF and the reaper both report before counting.
    let notices = pump_until(&mut registry, &rx, Duration::from_secs(3), |_| false);
    assert_eq!(exits_for(&notices, id), 1);
    registry.close(id);
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
}

#[test]
fn natural_exit_reports_exit_code() {
    let (mut registry, rx) = registry(4);
    let id = registry.create(&CreateRequest::default()).unwrap();
    registry.write(id, "exit 7\n");
    let notices = pump_until(&mut registry, &rx, Duration::from_secs(5), |n| {
        exits_for(n, id) > 0
    });
    let exit = notices.iter().find_map(|notice| match notice {
        TerminalNotice::Exit { id: got, exit_code, signal } if *got == id => {
            Some((*exit_code, *signal))
        }
        _ => None,
    });
    assert_eq!(exit, Some((7, None)));
    assert!(!registry.is_active(id));
    // Writes after exit are silently ignored.
    registry.write(id, "echo ignored\n");
    registry.resize(id, 10, 10);
}

#[test]
fn stale_reaper_reports_are_ignored() {
    let (mut registry, _rx) = registry(4);
    let notices = registry.handle_event(TerminalEvent::Reaped {
        id: 99,
        exit_code: 0,
        signal: None,
    });
    assert!(notices.is_empty());
    assert!(registry
        .handle_event(TerminalEvent::Eof { id: 99 })
        .is_empty());
    assert!(registry
        .handle_event(TerminalEvent::Output {
            id: 99,
            data: b"late".to_vec()
        })
        .is_empty());
}

#[test]
fn close_all_is_silent_and_blocks_new_sessions() {
    let (mut registry, rx) = registry(4);
    let a = registry.create(&CreateRequest::default()).unwrap();
    let b = registry.create(&CreateRequest::default()).unwrap();
    registry.close_all();
    assert!(registry.is_empty());
    assert!(registry.is_closed());
    registry.write(a, "echo nope\n");
    registry.resize(b, 10, 10);
    registry.close(a);
    let notices = pump_until(&mut registry, &rx, Duration::from_secs(2), |_| false);
    assert!(notices
        .iter()
        .all(|notice| !matches!(notice, TerminalNotice::Exit { .. })));
    assert!(registry.create(&CreateRequest::default()).is_err());
    registry.close_all();
}

#[test]
fn create_fails_for_missing_cwd_without_allocating_an_id() {
    let (mut registry, _rx) = registry(4);
    let err = registry
        .create(&CreateRequest {
            cwd: Some("/definitely/not/here/4242".to_string()),
            ..CreateRequest::default()
        })
        .unwrap_err();
    assert!(err.to_string().contains("does not exist"));
    assert!(registry.is_empty());
    let id = registry.create(&CreateRequest::default()).unwrap();
    assert_eq!(id, 1);
    registry.close_all();
}

#[test]
fn create_fails_for_missing_shell() {
    let (tx, _rx) = unbounded();
    let mut bad = defaults(4);
    bad.shell = ShellCommand::parse("/no/such/shell-4242").unwrap();
    let mut registry = TerminalRegistry::new(bad, tx);
    assert!(registry.create(&CreateRequest::default()).is_err());
    assert!(registry.is_empty());
}

#[test]
fn create_respects_terminal_limit() {
    let (mut registry, _rx) = registry(1);
    registry.create(&CreateRequest::default()).unwrap();
    let err = registry.create(&CreateRequest::default()).unwrap_err();
    assert!(err.to_string().contains("limit"));
    registry.close_all();
}

#[test]
fn split_utf8_output_is_reassembled() {
    let (mut registry, _rx) = registry(4);
    let id = registry.create(&CreateRequest::default()).unwrap();
    let bytes = "é".as_bytes();
    let first = registry.handle_event(TerminalEvent::Output {
        id,
        data: vec![b'a', bytes[0]],
    });
    assert_eq!(
        first,
        vec![TerminalNotice::Output {
            id,
            data: "a".to_string()
        }]
    );
    let second = registry.handle_event(TerminalEvent::Output {
        id,
        data: vec![bytes[1]],
    });
    assert_eq!(
        second,
        vec![TerminalNotice::Output {
            id,
            data: "é".to_string()
        }]
    );
    registry.close_all();
}
