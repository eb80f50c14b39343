use anyhow::{anyhow, bail, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use deskremote::assistant::Assistant;
use deskremote::client::{ClientState, TerminalKind};
use deskremote::ipc::{run_connection, ClientMessage, InboundFrame, ServerMessage, Services};
use deskremote::pty_session::ShellCommand;
use deskremote::stt::Transcriber;
use deskremote::terminals::TerminalDefaults;
use deskremote::windows::{
    Bounds, CatalogFilter, IconCache, Pixels, RawWindow, ScreenshotTiming, WindowControl,
    WindowId,
};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct StaticDesktop {
    windows: Vec<RawWindow>,
}

impl WindowControl for StaticDesktop {
    fn list_windows(&self) -> Result<Vec<RawWindow>> {
        Ok(self.windows.clone())
    }
    fn focus(&self, id: &WindowId) -> Result<bool> {
        Ok(self.windows.iter().any(|w| &w.id == id))
    }
    fn close(&self, id: &WindowId) -> Result<bool> {
        Ok(self.windows.iter().any(|w| &w.id == id))
    }
    fn maximize(&self, _id: &WindowId) -> Result<bool> {
        Ok(false)
    }
    fn minimize(&self, _id: &WindowId) -> Result<bool> {
        Ok(false)
    }
    fn bounds(&self, _id: &WindowId) -> Result<Option<Bounds>> {
        Ok(None)
    }
    fn set_bounds(&self, _id: &WindowId, _bounds: Bounds) -> Result<bool> {
        Ok(false)
    }
    fn screen_size(&self) -> Result<(u32, u32)> {
        bail!("no display")
    }
    fn capture_pixels(&self, _region: Bounds) -> Result<Pixels> {
        bail!("no display")
    }
    fn inject_text(&self, _id: &WindowId, _text: &str) -> Result<()> {
        bail!("Could not focus window")
    }
}

struct FixedTranscriber(&'static str);

impl Transcriber for FixedTranscriber {
    fn transcribe(&self, audio: &[u8]) -> Result<String> {
        if audio.is_empty() {
            return Err(anyhow!("audio clip is empty"));
        }
        Ok(self.0.to_string())
    }
}

struct CannedAssistant;

impl Assistant for CannedAssistant {
    fn answer(&self, prompt: &str) -> Result<String> {
        Ok(format!("You asked: {prompt}"))
    }
}

fn raw_window(id: u64, title: &str, exe: &str) -> RawWindow {
    RawWindow {
        id: WindowId::Num(id),
        title: title.to_string(),
        path: Some(exe.to_string()),
        process_id: Some(1000 + id as u32),
        bounds: Bounds {
            x: 0,
            y: 0,
            width: 800,
            height: 600,
        },
        visible: true,
    }
}

fn services() -> Arc<Services> {
    Arc::new(Services {
        windows: Arc::new(StaticDesktop {
            windows: vec![
                raw_window(1, "Terminal", "/usr/bin/xterm"),
                raw_window(2, "Program Manager", "C:\\Windows\\explorer.exe"),
                raw_window(3, "Input", "C:\\Windows\\TextInputHost.exe"),
                raw_window(4, "Browser", "/usr/bin/firefox"),
            ],
        }),
        transcriber: Arc::new(FixedTranscriber("open the pod bay doors")),
        assistant: Arc::new(CannedAssistant),
        filter: CatalogFilter {
            ignored_titles: vec!["Program Manager".to_string()],
            ignored_executables: vec!["TextInputHost.exe".to_string()],
            min_width: 100,
            min_height: 50,
        },
        icons: Box::leak(Box::new(IconCache::new())),
        terminal_defaults: TerminalDefaults {
            shell: ShellCommand::parse("/bin/sh").expect("shell"),
            term: "xterm-256color".to_string(),
            cwd: std::env::temp_dir(),
            cols: 80,
            rows: 24,
            max_terminals: 8,
        },
        projects_dir: std::env::temp_dir().join("deskremote-flow-no-projects"),
        close_refresh_delay: Duration::from_millis(10),
        screenshot_timing: ScreenshotTiming {
            after_resize: Duration::ZERO,
            after_focus: Duration::ZERO,
        },
    })
}

struct Connection {
    inbound: Option<Sender<InboundFrame>>,
    replies: Receiver<ServerMessage>,
    handle: Option<JoinHandle<()>>,
}

impl Connection {
    fn open() -> Self {
        let (in_tx, in_rx) = unbounded();
        let (out_tx, out_rx) = unbounded();
        let services = services();
        let handle = thread::spawn(move || run_connection(services, in_rx, out_tx));
        let conn = Self {
            inbound: Some(in_tx),
            replies: out_rx,
            handle: Some(handle),
        };
        assert!(matches!(conn.next(), ServerMessage::Windows { .. }));
        conn
    }

    fn send(&self, message: &ClientMessage) {
        let text = serde_json::to_string(message).expect("encode");
        self.send_frame(InboundFrame::Text(text));
    }

    fn send_frame(&self, frame: InboundFrame) {
        self.inbound
            .as_ref()
            .expect("connection open")
            .send(frame)
            .expect("connection loop alive");
    }

    fn next(&self) -> ServerMessage {
        self.replies
            .recv_timeout(Duration::from_secs(10))
            .expect("expected a server message")
    }

    fn next_matching(&self, pred: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if let Ok(message) = self.replies.recv_timeout(Duration::from_millis(100)) {
                if pred(&message) {
                    return message;
                }
            }
        }
        panic!("no matching server message");
    }

    fn drain_for(&self, window: Duration) -> Vec<ServerMessage> {
        let deadline = Instant::now() + window;
        let mut seen = Vec::new();
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match self.replies.recv_timeout(left) {
                Ok(message) => seen.push(message),
                Err(_) => break,
            }
        }
        seen
    }

    fn disconnect(&mut self) {
        self.inbound.take();
        if let Some(handle) = self.handle.take() {
            handle.join().expect("connection loop exits cleanly");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn create_terminal(conn: &Connection) -> u32 {
    conn.send(&ClientMessage::TerminalCreate {
        cols: Some(80),
        rows: Some(24),
        cwd: None,
        terminal_type: None,
    });
    match conn.next_matching(|m| {
        matches!(
            m,
            ServerMessage::TerminalCreated { .. } | ServerMessage::TerminalError { .. }
        )
    }) {
        ServerMessage::TerminalCreated { term_id } => term_id,
        other => panic!("terminal create failed: {other:?}"),
    }
}

fn process_alive(pid: libc::pid_t) -> bool {
    // SAFETY: signal 0 only checks that the pid exists.
    unsafe { libc::kill(pid, 0) == 0 }
}

#[test]
fn create_then_close_yields_exactly_one_exit() {
    let conn = Connection::open();
    let id = create_terminal(&conn);
    assert!(id > 0);

    conn.send(&ClientMessage::TerminalClose { term_id: id });
    let exit = conn.next_matching(|m| matches!(m, ServerMessage::TerminalExit { .. }));
    assert!(matches!(exit, ServerMessage::TerminalExit { term_id, .. } if term_id == id));

    let later = conn.drain_for(Duration::from_millis(700));
    assert!(
        !later
            .iter()
            .any(|m| matches!(m, ServerMessage::TerminalExit { .. })),
        "second exit after close: {later:?}"
    );
}

#[test]
fn session_ids_increase_and_are_never_reused() {
    let conn = Connection::open();
    let first = create_terminal(&conn);
    let second = create_terminal(&conn);
    conn.send(&ClientMessage::TerminalClose { term_id: second });
    conn.next_matching(|m| matches!(m, ServerMessage::TerminalExit { .. }));
    let third = create_terminal(&conn);
    assert!(first < second && second < third);
}

#[test]
fn natural_exit_reports_the_exit_code() {
    let conn = Connection::open();
    let id = create_terminal(&conn);
    conn.send(&ClientMessage::TerminalInput {
        term_id: id,
        data: "exit 5\n".to_string(),
    });
    let exit = conn.next_matching(|m| matches!(m, ServerMessage::TerminalExit { .. }));
    assert_eq!(
        exit,
        ServerMessage::TerminalExit {
            term_id: id,
            exit_code: 5,
            signal: None
        }
    );

    // Input after exit is a silent no-op.
    conn.send(&ClientMessage::TerminalInput {
        term_id: id,
        data: "echo late\n".to_string(),
    });
    conn.send(&ClientMessage::TerminalResize {
        term_id: id,
        cols: 100,
        rows: 30,
    });
    assert!(conn.drain_for(Duration::from_millis(300)).is_empty());
}

#[test]
fn disconnect_terminates_every_shell() {
    let mut conn = Connection::open();
    let pid_file = tempfile::NamedTempFile::new().expect("pid file");
    let id = create_terminal(&conn);
    conn.send(&ClientMessage::TerminalInput {
        term_id: id,
        data: format!("echo $$ > {}\n", pid_file.path().display()),
    });

    let deadline = Instant::now() + Duration::from_secs(10);
    let pid = loop {
        let contents = std::fs::read_to_string(pid_file.path()).unwrap_or_default();
        if let Ok(pid) = contents.trim().parse::<libc::pid_t>() {
            break pid;
        }
        assert!(Instant::now() < deadline, "shell never wrote its pid");
        thread::sleep(Duration::from_millis(20));
    };
    assert!(process_alive(pid));

    conn.disconnect();
    let deadline = Instant::now() + Duration::from_secs(5);
    while process_alive(pid) {
        assert!(Instant::now() < deadline, "shell {pid} outlived its connection");
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn flooding_shell_waits_on_a_full_reply_queue() {
    let (in_tx, in_rx) = unbounded();
    let (out_tx, out_rx) = bounded(8);
    let (done_tx, done_rx) = unbounded();
    let services = services();
    thread::spawn(move || {
        run_connection(services, in_rx, out_tx);
        let _ = done_tx.send(());
    });
    let send = |message: &ClientMessage| {
        let text = serde_json::to_string(message).expect("encode");
        in_tx.send(InboundFrame::Text(text)).expect("loop alive");
    };
    let recv = || {
        out_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("expected a server message")
    };

    assert!(matches!(recv(), ServerMessage::Windows { .. }));
    send(&ClientMessage::TerminalCreate {
        cols: Some(80),
        rows: Some(24),
        cwd: None,
        terminal_type: None,
    });
    let ServerMessage::TerminalCreated { term_id } = recv() else {
        panic!("terminal was not created");
    };
    send(&ClientMessage::TerminalInput {
        term_id,
        data: "yes\n".to_string(),
    });

    let deadline = Instant::now() + Duration::from_secs(10);
    while !out_rx.is_full() {
        assert!(Instant::now() < deadline, "output never filled the queue");
        thread::sleep(Duration::from_millis(20));
    }
    thread::sleep(Duration::from_millis(200));
    assert_eq!(out_rx.len(), 8);

    // Draining lets output flow again.
    for _ in 0..16 {
        assert!(matches!(recv(), ServerMessage::TerminalOutput { .. }));
    }

    // A client that stops reading and goes away still lets the loop finish.
    drop(out_rx);
    drop(in_tx);
    done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("connection loop finished");
}

#[test]
fn catalog_excludes_denylisted_windows() {
    let conn = Connection::open();
    conn.send(&ClientMessage::GetWindows);
    match conn.next() {
        ServerMessage::Windows { data } => {
            let titles: Vec<&str> = data.iter().map(|t| t.title.as_str()).collect();
            assert_eq!(titles, vec!["Terminal", "Browser"]);
        }
        other => panic!("unexpected reply {other:?}"),
    }
}

#[test]
fn targeted_audio_reply_carries_the_window_id() {
    let conn = Connection::open();
    conn.send(&ClientMessage::AudioStart {
        window_id: Some(WindowId::from("W1")),
        term_id: None,
    });
    conn.send_frame(InboundFrame::Binary(vec![1, 2, 3, 4]));
    assert_eq!(
        conn.next(),
        ServerMessage::Transcription {
            text: "open the pod bay doors".to_string(),
            window_id: Some(WindowId::from("W1"))
        }
    );
}

#[test]
fn client_model_round_trip_for_assistant_dictation() {
    let conn = Connection::open();
    let mut client = ClientState::new();

    conn.send(&client.start_assistant_dictation());
    conn.send_frame(InboundFrame::Binary(b"clip".to_vec()));
    let transcription = conn.next();
    let follow_up = client.apply(transcription);
    assert_eq!(follow_up.len(), 1);
    conn.send(&follow_up[0]);

    let answer = conn.next();
    client.apply(answer);
    assert_eq!(
        client.assistant.response,
        Some(Ok("You asked: open the pod bay doors".to_string()))
    );
}

#[test]
fn client_model_types_terminal_dictation() {
    let conn = Connection::open();
    let mut client = ClientState::new();
    conn.send(&client.request_terminal(80, 24, None, TerminalKind::Regular));
    let created = conn.next();
    client.apply(created);
    let id = *client.terminals.keys().next().expect("terminal view");

    conn.send(&client.start_terminal_dictation(id));
    conn.send_frame(InboundFrame::Binary(b"clip".to_vec()));
    let reply = conn.next_matching(|m| matches!(m, ServerMessage::TerminalTranscription { .. }));
    client.apply(reply);
    assert_eq!(client.terminals[&id].dictation, "open the pod bay doors");

    // The tty echoes the typed words back.
    for frame in client.submit_terminal_dictation(id, TerminalKind::Regular.line_ending()) {
        conn.send(&frame);
    }
    let deadline = Instant::now() + Duration::from_secs(10);
    while !client.terminals[&id].output.contains("pod bay") {
        assert!(Instant::now() < deadline, "dictation never reached the shell");
        if let Ok(message) = conn.replies.recv_timeout(Duration::from_millis(100)) {
            client.apply(message);
        }
    }
}

fn read_server_message<S: std::io::Read + std::io::Write>(
    socket: &mut tungstenite::WebSocket<S>,
) -> ServerMessage {
    loop {
        if let tungstenite::Message::Text(text) = socket.read().expect("read") {
            return serde_json::from_str(&text).expect("decode");
        }
    }
}

#[test]
fn websocket_transport_carries_text_and_binary_frames() {
    use tungstenite::Message;

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let services = services();
    thread::spawn(move || deskremote::server::serve_listener(listener, services));

    let (mut socket, _) = tungstenite::connect(format!("ws://{addr}")).expect("connect");
    assert!(matches!(
        read_server_message(&mut socket),
        ServerMessage::Windows { .. }
    ));

    let start = serde_json::to_string(&ClientMessage::AudioStart {
        window_id: Some(WindowId::Num(4)),
        term_id: None,
    })
    .expect("encode");
    socket.send(Message::Text(start)).expect("send text");
    socket
        .send(Message::Binary(vec![0x1a, 0x45, 0xdf, 0xa3]))
        .expect("send binary");

    assert_eq!(
        read_server_message(&mut socket),
        ServerMessage::Transcription {
            text: "open the pod bay doors".to_string(),
            window_id: Some(WindowId::Num(4))
        }
    );

    close_socket(&mut socket);
}

fn close_socket<S: std::io::Read + std::io::Write>(socket: &mut tungstenite::WebSocket<S>) {
    let _ = socket.close(None);
    while socket.read().is_ok() {}
}
