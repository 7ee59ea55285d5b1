//! 서브프로세스 라인 소스
//!
//! 외부 명령을 실행하고 표준 출력을 라인 단위로 읽습니다.
//! 프로세스 핸들과 출력 리더를 하나의 [`LineSource`]가 소유하며,
//! 어떤 경로로 끝나든 (정상 종료, 취소, 에러, 패닉) 프로세스를 정리합니다.
//!
//! # 종료 절차
//! 1. 출력 핸들을 닫음
//! 2. 취소된 경우 프로세스 그룹 전체에 `SIGTERM`
//! 3. 유예 시간 안에 끝나지 않으면 `SIGKILL`
//! 4. 리더가 회수된 뒤 남은 그룹 구성원에 `SIGTERM`, 유예 후 `SIGKILL`
//! 5. 종료 상태를 [`ExitOutcome`]으로 보고

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use logtally_core::error::SourceError;

/// 라인 버퍼의 기본 용량 (바이트)
const LINE_BUFFER_CAPACITY: usize = 1024;

/// 남은 그룹 구성원 확인 주기
#[cfg(unix)]
const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 서브프로세스 종료 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// 종료 코드 0
    Success,
    /// 0이 아닌 종료 코드
    ExitCode(i32),
    /// 외부 시그널로 종료
    Signaled(i32),
    /// 정리 과정에서 우리가 종료시킴
    Terminated,
    /// 종료 상태를 확인할 수 없음
    Unknown(String),
}

impl ExitOutcome {
    /// 정상 종료 여부 (취소로 인한 종료 포함)
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Success | Self::Terminated)
    }

    fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            return Self::Success;
        }
        if let Some(code) = status.code() {
            return Self::ExitCode(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signaled(signal);
            }
        }
        Self::Unknown(status.to_string())
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "exited successfully"),
            Self::ExitCode(code) => write!(f, "exited with code {code}"),
            Self::Signaled(signal) => write!(f, "killed by signal {signal}"),
            Self::Terminated => write!(f, "terminated on shutdown"),
            Self::Unknown(reason) => write!(f, "unknown exit status: {reason}"),
        }
    }
}

/// 라인 소스 설정
#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// 최대 라인 길이 (바이트). 초과 라인은 건너뜀
    pub max_line_length: usize,
    /// 종료 신호 후 프로세스 종료를 기다리는 시간
    pub stop_timeout: Duration,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            max_line_length: 64 * 1024, // 64KB
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// 외부 명령의 표준 출력 라인 스트림
///
/// `next_line`이 `None`을 반환하면 스트림이 끝난 것입니다
/// (프로세스가 출력을 닫았거나, 읽기 에러, 또는 취소).
/// 이후 [`LineSource::stop`]으로 프로세스를 정리하고 종료 결과를 받습니다.
pub struct LineSource {
    command_line: String,
    child: Option<Child>,
    reader: Option<BufReader<ChildStdout>>,
    cancel: CancellationToken,
    options: SourceOptions,
    buffer: Vec<u8>,
    lines_dropped: u64,
    read_error: Option<SourceError>,
}

impl LineSource {
    /// 명령을 실행합니다.
    ///
    /// 첫 요소를 실행 파일로, 나머지를 인자로 사용합니다.
    /// 표준 입력은 닫고 표준 에러는 버립니다.
    /// Unix에서는 자식을 새 프로세스 그룹의 리더로 만들어 종료 시 그룹 전체에 신호를 보냅니다.
    pub fn start(
        command: &[String],
        cancel: CancellationToken,
        options: SourceOptions,
    ) -> Result<Self, SourceError> {
        let command_line = command.join(" ");
        let Some((program, args)) = command.split_first() else {
            return Err(SourceError::Start {
                command: command_line,
                reason: "empty command".to_owned(),
            });
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| SourceError::Start {
            command: command_line.clone(),
            reason: e.to_string(),
        })?;

        let Some(stdout) = child.stdout.take() else {
            return Err(SourceError::Start {
                command: command_line,
                reason: "stdout was not captured".to_owned(),
            });
        };

        debug!(command = %command_line, pid = child.id(), "subprocess started");

        Ok(Self {
            command_line,
            child: Some(child),
            reader: Some(BufReader::new(stdout)),
            cancel,
            options,
            buffer: Vec::with_capacity(LINE_BUFFER_CAPACITY),
            lines_dropped: 0,
            read_error: None,
        })
    }

    /// 다음 라인을 읽습니다.
    ///
    /// 라인이 준비되거나, 출력이 끝나거나, 취소될 때까지 대기합니다.
    /// 끝의 `\n`과 `\r`은 제거되며 UTF-8이 아닌 바이트는 대체 문자로 바뀝니다.
    pub async fn next_line(&mut self) -> Option<String> {
        loop {
            let reader = self.reader.as_mut()?;
            self.buffer.clear();

            let max = self.options.max_line_length;
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(command = %self.command_line, "line source cancelled");
                    self.reader = None;
                    return None;
                }
                read = read_bounded_line(reader, &mut self.buffer, max) => read,
            };

            match read {
                Ok(RawLine::Eof) => {
                    debug!(command = %self.command_line, "subprocess closed its output");
                    self.reader = None;
                    return None;
                }
                Ok(RawLine::Overlong(length)) => {
                    self.skip_overlong(length);
                    continue;
                }
                Ok(RawLine::Line) => {
                    let line = trim_line_ending(&self.buffer);
                    if line.len() > max {
                        let length = line.len();
                        self.skip_overlong(length);
                        continue;
                    }
                    return Some(String::from_utf8_lossy(line).into_owned());
                }
                Err(e) => {
                    let err = SourceError::Read {
                        command: self.command_line.clone(),
                        reason: e.to_string(),
                    };
                    warn!(error = %err, "stopped reading subprocess output");
                    self.read_error = Some(err);
                    self.reader = None;
                    return None;
                }
            }
        }
    }

    fn skip_overlong(&mut self, length: usize) {
        self.lines_dropped += 1;
        self.buffer.clear();
        self.buffer.shrink_to(LINE_BUFFER_CAPACITY);
        warn!(
            command = %self.command_line,
            length,
            max = self.options.max_line_length,
            "line exceeds max length, skipping"
        );
    }

    /// 프로세스를 정리하고 종료 결과를 반환합니다.
    ///
    /// 출력 핸들을 닫은 뒤, 취소된 경우에는 프로세스 그룹에 `SIGTERM`을 보내고
    /// 그렇지 않으면 스스로 끝나기를 기다립니다. 유예 시간이 지나면 강제 종료합니다.
    /// 리더가 끝난 뒤에도 그룹에 남은 백그라운드 프로세스는 같은 절차로 정리합니다.
    pub async fn stop(mut self) -> ExitOutcome {
        self.reader = None;
        let Some(mut child) = self.child.take() else {
            return ExitOutcome::Unknown("process already reaped".to_owned());
        };

        let grace = self.options.stop_timeout;
        let pgid = child.id();
        let mut terminated = false;
        let mut killed = false;

        if self.cancel.is_cancelled() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let outcome = ExitOutcome::from_status(status);
                    self.settle_group(pgid, grace).await;
                    return outcome;
                }
                Ok(None) => {
                    terminate(&mut child);
                    terminated = true;
                }
                Err(e) => warn!(command = %self.command_line, error = %e, "failed to poll subprocess"),
            }
        }

        let outcome = match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => ExitOutcome::from_status(status),
            Ok(Err(e)) => ExitOutcome::Unknown(e.to_string()),
            Err(_) => {
                warn!(
                    command = %self.command_line,
                    grace_secs = grace.as_secs_f64(),
                    "subprocess did not exit in time, killing"
                );
                kill(&mut child);
                terminated = true;
                killed = true;
                match child.wait().await {
                    Ok(status) => ExitOutcome::from_status(status),
                    Err(e) => ExitOutcome::Unknown(e.to_string()),
                }
            }
        };

        // SIGKILL은 이미 그룹 전체에 전달됨
        if !killed {
            self.settle_group(pgid, grace).await;
        }

        if terminated && !matches!(outcome, ExitOutcome::Success | ExitOutcome::ExitCode(_)) {
            ExitOutcome::Terminated
        } else {
            outcome
        }
    }

    /// 리더가 회수된 뒤 그룹에 남은 프로세스를 정리합니다.
    ///
    /// 남은 구성원이 없으면 (`ESRCH`) 바로 반환합니다.
    #[cfg(unix)]
    async fn settle_group(&self, pgid: Option<u32>, grace: Duration) {
        let Some(pgid) = pgid else {
            return;
        };
        match signal_group(pgid, libc::SIGTERM) {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == Some(libc::ESRCH) => return,
            Err(e) => {
                debug!(pgid, error = %e, "failed to signal leftover process group");
                return;
            }
        }
        debug!(command = %self.command_line, pgid, "terminating leftover process group members");

        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline {
            if !group_exists(pgid) {
                return;
            }
            tokio::time::sleep(GROUP_POLL_INTERVAL).await;
        }

        warn!(
            command = %self.command_line,
            pgid,
            grace_secs = grace.as_secs_f64(),
            "process group members did not exit in time, killing"
        );
        if let Err(e) = signal_group(pgid, libc::SIGKILL) {
            debug!(pgid, error = %e, "failed to kill leftover process group");
        }
    }

    #[cfg(not(unix))]
    async fn settle_group(&self, _pgid: Option<u32>, _grace: Duration) {}

    /// 실행 중인 프로세스 ID
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// 로그용 명령 문자열
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// 최대 길이 초과로 건너뛴 라인 수
    pub fn lines_dropped(&self) -> u64 {
        self.lines_dropped
    }

    /// 스트리밍 중 발생한 읽기 에러
    pub fn read_error(&self) -> Option<&SourceError> {
        self.read_error.as_ref()
    }
}

impl Drop for LineSource {
    fn drop(&mut self) {
        // stop()을 거치지 않은 경로 (에러, 패닉)
        if let Some(child) = self.child.as_mut() {
            kill(child);
        }
    }
}

impl fmt::Debug for LineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineSource")
            .field("command", &self.command_line)
            .field("pid", &self.id())
            .field("streaming", &self.reader.is_some())
            .finish()
    }
}

fn trim_line_ending(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

/// 한 라인을 읽은 결과
#[derive(Debug, PartialEq, Eq)]
enum RawLine {
    /// 출력 끝
    Eof,
    /// 버퍼에 라인이 담김
    Line,
    /// 한도를 넘어 버린 라인 (버린 바이트 수)
    Overlong(usize),
}

/// `\n`까지 읽되 `buf`에는 `max + 2`바이트 (`\r\n` 포함)까지만 담습니다.
///
/// 한도를 넘으면 버퍼를 비우고 나머지 바이트는 저장하지 않고 소비합니다.
async fn read_bounded_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
) -> std::io::Result<RawLine>
where
    R: AsyncBufRead + Unpin,
{
    let limit = max.saturating_add(2);
    let mut discarded: Option<usize> = None;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(match discarded {
                Some(length) => RawLine::Overlong(length),
                None if buf.is_empty() => RawLine::Eof,
                None => RawLine::Line,
            });
        }

        let (used, found) = match available.iter().position(|b| *b == b'\n') {
            Some(idx) => (idx + 1, true),
            None => (available.len(), false),
        };

        match discarded.as_mut() {
            Some(length) => *length += used,
            None if buf.len() + used > limit => {
                discarded = Some(buf.len() + used);
                buf.clear();
            }
            None => buf.extend_from_slice(&available[..used]),
        }
        reader.consume(used);

        if found {
            return Ok(match discarded {
                Some(length) => RawLine::Overlong(length),
                None => RawLine::Line,
            });
        }
    }
}

/// 프로세스 그룹에 `SIGTERM`을 보냅니다.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            if let Err(e) = signal_group(pid, libc::SIGTERM) {
                debug!(pid, error = %e, "failed to signal process group");
            }
            return;
        }
    }
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "failed to kill subprocess");
    }
}

/// 프로세스 그룹 전체를 강제 종료합니다.
fn kill(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            if let Err(e) = signal_group(pid, libc::SIGKILL) {
                debug!(pid, error = %e, "failed to signal process group");
            }
        }
    }
    // 그룹 신호가 실패해도 리더는 확실히 종료
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "failed to kill subprocess");
    }
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: libc::c_int) -> std::io::Result<()> {
    let pgid = libc::pid_t::try_from(pgid)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: killpg(2)는 신호만 전달합니다. pgid는 process_group(0)으로 만든 자식의 그룹입니다.
    let rc = unsafe { libc::killpg(pgid, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// 그룹에 (좀비 포함) 프로세스가 남아 있는지 확인합니다.
#[cfg(unix)]
fn group_exists(pgid: u32) -> bool {
    !matches!(signal_group(pgid, 0), Err(e) if e.raw_os_error() == Some(libc::ESRCH))
}
