//! An in-memory stand-in for a SONiC DUT or PTF host.
//!
//! [`FakeHost`] implements [`Backend`] by interpreting the small set of
//! commands the harness sends: file tests and edits, `systemctl`, `date`,
//! `ntpstat`, `sonic-cfggen` and `config ntp`.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dut_ntp::backend::{Backend, ExecResult, display_command};
use dut_ntp::config::Timing;
use dut_ntp::errors::{NtpResult, NtpTestError};
use dut_ntp::host::RemoteHost;
use dut_ntp::poll::Poll;
use dut_ntp::testbed::Testbed;

pub const NTPSEC_DEFAULTS: &str = "/etc/default/ntpsec";
pub const NTP_DEFAULTS: &str = "/etc/default/ntp";
pub const PTF_NTP_CONF: &str = "/etc/ntp.conf";

#[derive(Debug, Default)]
pub struct FakeState {
    pub files: HashMap<String, String>,
    /// DUT clock minus real clock, in seconds.
    pub clock_offset: i64,
    pub running: HashMap<String, bool>,
    /// `ntpstat` calls since ntp was last (re)started.
    pub ntpstat_calls: u32,
    /// `ntpstat` reports synchronised from this call on; `None` never.
    pub sync_after: Option<u32>,
    pub ntp_servers: Vec<String>,
    /// Make `ntpstat` fail at the transport level.
    pub unreachable: bool,
    pub history: Vec<String>,
    pub faults: Vec<Fault>,
}

/// Make the commands that start with `prefix` fail, after letting `skip`
/// of them through.
#[derive(Debug, Clone)]
pub struct Fault {
    pub prefix: String,
    pub skip: u32,
    pub kind: FaultKind,
}

#[derive(Debug, Clone)]
pub enum FaultKind {
    /// The transport reports an error.
    Transport(String),
    /// The command runs and exits non-zero.
    Exit(i32, String),
}

pub struct FakeHost {
    name: String,
    state: Mutex<FakeState>,
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn ok(stdout: impl Into<String>) -> ExecResult {
    ExecResult {
        stdout: Bytes::from(stdout.into()),
        stderr: Bytes::new(),
        exit_code: 0,
    }
}

fn fail(code: i32, stderr: &str) -> ExecResult {
    ExecResult {
        stdout: Bytes::new(),
        stderr: Bytes::from(stderr.to_string()),
        exit_code: code,
    }
}

impl FakeHost {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            state: Mutex::new(FakeState {
                sync_after: Some(3),
                ..FakeState::default()
            }),
        })
    }

    /// A DUT running ntpsec in slew mode with one configured server.
    pub fn ntpsec_dut() -> Arc<Self> {
        let host = Self::new("dut1");
        {
            let mut s = host.state();
            s.files.insert("/etc/ntpsec/ntp.conf".into(), String::new());
            s.files
                .insert(NTPSEC_DEFAULTS.into(), "# ntpsec\nNTPD_OPTS=\"-x -N\"\n".into());
            s.ntp_servers = vec!["10.20.8.129".into()];
            s.running.insert("ntp".into(), true);
        }
        host
    }

    /// A DUT running classic ntpd in slew mode with no configured servers.
    pub fn classic_dut() -> Arc<Self> {
        let host = Self::new("dut2");
        {
            let mut s = host.state();
            s.files.insert(NTP_DEFAULTS.into(), "NTPD_OPTS='-x'\n".into());
            s.running.insert("ntp".into(), true);
        }
        host
    }

    pub fn ptf() -> Arc<Self> {
        let host = Self::new("ptf1");
        host.state()
            .files
            .insert(PTF_NTP_CONF.into(), "driftfile /var/lib/ntp/ntp.drift\n".into());
        host
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state().files.get(path).cloned()
    }

    pub fn inject(&self, prefix: &str, skip: u32, kind: FaultKind) {
        self.state().faults.push(Fault {
            prefix: prefix.to_string(),
            skip,
            kind,
        });
    }

    pub fn ran(&self, command: &str) -> bool {
        self.state().history.iter().any(|c| c == command)
    }

    fn handle(&self, s: &mut FakeState, program: &str, args: &[&str]) -> NtpResult<ExecResult> {
        // `sudo` is transparent here.
        if program == "sudo" {
            let (inner, rest) = args
                .split_first()
                .ok_or_else(|| NtpTestError::Internal("bare sudo".into()))?;
            return self.handle(s, inner, rest);
        }

        let result = match (program, args) {
            ("test", ["-e", path]) => {
                if s.files.contains_key(*path) {
                    ok("")
                } else {
                    fail(1, "")
                }
            }
            ("grep", ["-qF", "--", needle, path]) => match s.files.get(*path) {
                Some(text) if text.contains(needle) => ok(""),
                Some(_) => fail(1, ""),
                None => fail(2, "grep: No such file or directory"),
            },
            ("grep", ["-qxF", "--", line, path]) => match s.files.get(*path) {
                Some(text) if text.lines().any(|l| l == *line) => ok(""),
                Some(_) => fail(1, ""),
                None => fail(2, "grep: No such file or directory"),
            },
            ("sed", ["-i", expr, path]) => {
                let fields = split_sed(expr);
                let Some(text) = s.files.get_mut(*path) else {
                    return Ok(fail(2, "sed: can't read file"));
                };
                if fields.len() != 3 {
                    return Ok(fail(1, "sed: bad expression"));
                }
                let edited: Vec<String> = text
                    .lines()
                    .map(|l| l.replacen(&fields[1], &fields[2], 1))
                    .collect();
                *text = edited.join("\n") + "\n";
                ok("")
            }
            ("sh", ["-c", script]) => {
                let words = shell_words(script);
                match words.as_slice() {
                    [printf, _, line, redirect, path] if printf == "printf" && redirect == ">>" => {
                        let text = s.files.entry(path.clone()).or_default();
                        text.push_str(line);
                        text.push('\n');
                        ok("")
                    }
                    _ => fail(127, "sh: unsupported script"),
                }
            }
            ("systemctl", [action, name]) => {
                match *action {
                    "start" | "restart" => {
                        s.running.insert(name.to_string(), true);
                        if *name == "ntp" {
                            s.ntpstat_calls = 0;
                            let long_jump = s.files.values().any(|t| {
                                t.contains("NTPD_OPTS=\"-g -N\"") || t.contains("NTPD_OPTS='-g'")
                            });
                            if long_jump {
                                s.clock_offset = 0;
                            }
                        }
                    }
                    "stop" => {
                        s.running.insert(name.to_string(), false);
                    }
                    _ => return Ok(fail(1, "systemctl: unknown action")),
                }
                ok("")
            }
            ("ntpstat", []) => {
                if s.unreachable {
                    return Err(NtpTestError::RemoteError(format!(
                        "{}: connection closed",
                        self.name
                    )));
                }
                if !s.running.get("ntp").copied().unwrap_or(false) {
                    return Ok(fail(2, "ntpstat: cannot talk to daemon"));
                }
                s.ntpstat_calls += 1;
                match s.sync_after {
                    Some(n) if s.ntpstat_calls >= n => ok("synchronised to NTP server"),
                    _ => fail(1, "unsynchronised"),
                }
            }
            ("date", ["+%s"]) => ok(format!("{}\n", now() + s.clock_offset)),
            ("date", ["-s", at]) => match at.strip_prefix('@').and_then(|n| n.parse::<i64>().ok()) {
                Some(secs) => {
                    s.clock_offset = secs - now();
                    ok("")
                }
                None => fail(1, "date: invalid date"),
            },
            ("sonic-cfggen", ["-d", "--var-json", "NTP_SERVER"]) => {
                let entries: Vec<String> =
                    s.ntp_servers.iter().map(|a| format!("\"{a}\": {{}}")).collect();
                ok(format!("{{{}}}", entries.join(", ")))
            }
            ("config", ["ntp", "add", addr]) => {
                s.ntp_servers.push(addr.to_string());
                ok("")
            }
            ("config", ["ntp", "del", addr]) => {
                let before = s.ntp_servers.len();
                s.ntp_servers.retain(|a| a != addr);
                if s.ntp_servers.len() == before {
                    fail(1, "NTP server is not configured")
                } else {
                    ok("")
                }
            }
            ("getent", ["passwd", "ntp"]) => ok("ntp:x:106:110::/nonexistent:/usr/sbin/nologin\n"),
            ("timeout", [_, "ntpd", "-gq", "-u", _]) => {
                s.clock_offset = 0;
                ok("")
            }
            _ => fail(127, "command not found"),
        };
        Ok(result)
    }
}

#[async_trait]
impl Backend for FakeHost {
    async fn exec(&self, program: &str, args: &[&str]) -> NtpResult<ExecResult> {
        let mut s = self.state.lock().unwrap();
        let command = display_command(program, args);
        s.history.push(command.clone());
        if let Some(fault) = s.faults.iter_mut().find(|f| command.starts_with(&f.prefix)) {
            if fault.skip > 0 {
                fault.skip -= 1;
            } else {
                return match &fault.kind {
                    FaultKind::Transport(msg) => Err(NtpTestError::RemoteError(msg.clone())),
                    FaultKind::Exit(code, stderr) => Ok(fail(*code, stderr)),
                };
            }
        }
        self.handle(&mut s, program, args)
    }

    fn describe(&self) -> String {
        format!("fake:{}", self.name)
    }
}

/// Split `s/a/b/` on unescaped slashes, dropping the escapes.
fn split_sed(expr: &str) -> Vec<String> {
    let mut fields = vec![String::new()];
    let mut chars = expr.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    fields.last_mut().unwrap().push(next);
                }
            }
            '/' => fields.push(String::new()),
            c => fields.last_mut().unwrap().push(c),
        }
    }
    // "s", pattern, replacement, "" -> pattern and replacement at 1 and 2
    if fields.first().map(String::as_str) == Some("s") && fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }
    fields
}

/// Minimal POSIX word splitting: whitespace, single quotes, backslashes.
fn shell_words(script: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = script.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '\\' => {
                in_word = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Timing scaled down to milliseconds.
pub fn fast_timing() -> Timing {
    Timing {
        time_forward: 3600,
        sync: Poll::new(ms(400), ms(5)),
        server: Poll::new(ms(200), ms(5)),
    }
}

pub fn remote(fake: &Arc<FakeHost>, runtime: &Arc<tokio::runtime::Runtime>) -> RemoteHost {
    let backend: Arc<dyn Backend> = fake.clone();
    RemoteHost::new(fake.name.clone(), backend, Arc::clone(runtime))
}

pub fn testbed(dut: &Arc<FakeHost>, ptf: &Arc<FakeHost>, ipv6: bool) -> Testbed {
    let runtime = Testbed::runtime().unwrap();
    let ptf_host = remote(ptf, &runtime).with_mgmt_addrs(
        Some("10.0.0.100".into()),
        ipv6.then(|| "fc00::100".to_string()),
    );
    Testbed {
        dut: remote(dut, &runtime),
        ptf: ptf_host,
        timing: fast_timing(),
    }
}

#[test]
fn split_sed_unescapes() {
    assert_eq!(
        split_sed("s/a\\.b\\/c/x\\&y/"),
        vec!["s".to_string(), "a.b/c".to_string(), "x&y".to_string()]
    );
}

#[test]
fn shell_words_handles_quotes() {
    assert_eq!(
        shell_words("printf '%s\\n' 'it'\\''s here' >> '/etc/ntp.conf'"),
        vec!["printf", "%s\\n", "it's here", ">>", "/etc/ntp.conf"]
    );
}
