use crate::process::Process;
use futures::future;
use std::io;
use std::path::PathBuf;
use std::task::{Context, Poll};
use tower_service::Service;

/// Spawns the configured program once per upgraded connection, passing the
/// request path as its only argument.
#[derive(Clone, Debug)]
pub struct ProcessFactory {
    program: PathBuf,
}

impl ProcessFactory {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Service<String> for ProcessFactory {
    type Response = Process;
    type Error = io::Error;
    type Future = future::Ready<io::Result<Process>>;

    fn poll_ready(&mut self, _cx: &mut Context) -> Poll<io::Result<()>> {
        Ok(()).into()
    }

    fn call(&mut self, path: String) -> Self::Future {
        future::ready(Process::spawn(&self.program, &path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let mut factory = ProcessFactory::new("/nonexistent/ws-bridge-test-program");
        let res = factory.call("/socket".to_owned()).await;
        assert!(res.is_err());
    }
}
