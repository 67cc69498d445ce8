//! External commands with a wall-clock bound

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} did not finish within {}s", .limit.as_secs())]
    TimedOut { program: String, limit: Duration },

    #[error("failed to collect output of {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Like [`Command::output`], but kills the child once `limit` has elapsed.
///
/// stdout and stderr go to anonymous temp files so a chatty child never
/// blocks on a full pipe while we poll.
pub fn output_with_timeout(cmd: &mut Command, limit: Duration) -> Result<Output, ProcessError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let io_err = |source: io::Error| ProcessError::Io {
        program: program.clone(),
        source,
    };

    let mut stdout = tempfile::tempfile().map_err(io_err)?;
    let mut stderr = tempfile::tempfile().map_err(io_err)?;

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout.try_clone().map_err(io_err)?))
        .stderr(Stdio::from(stderr.try_clone().map_err(io_err)?))
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait().map_err(io_err)? {
            break status;
        }
        if started.elapsed() >= limit {
            let _ = child.kill();
            let _ = child.wait();
            tracing::warn!(%program, limit_secs = limit.as_secs(), "command timed out, killed");
            return Err(ProcessError::TimedOut {
                program: program.clone(),
                limit,
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(Output {
        status,
        stdout: read_back(&mut stdout).map_err(io_err)?,
        stderr: read_back(&mut stderr).map_err(io_err)?,
    })
}

fn read_back(file: &mut File) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut buf)?;
    Ok(buf)
}
