//! Scripted runner for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;

use super::{CommandOutput, CommandRunner, CommandSpec};

/// A recorded invocation.
#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub spec: CommandSpec,
    pub interactive: bool,
}

impl Call {
    pub fn line(&self) -> String {
        self.spec.to_string()
    }
}

/// Runner that answers from a list of `(command prefix, output)` rules and
/// records every call. Unmatched commands succeed with empty output.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    rules: Mutex<Vec<(String, CommandOutput)>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers commands whose display line starts with `prefix`.
    /// Earlier rules win.
    pub fn on(self, prefix: &str, output: CommandOutput) -> Self {
        self.rules
            .lock()
            .unwrap()
            .push((prefix.to_string(), output));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(Call::line).collect()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.lines().iter().filter(|l| l.starts_with(prefix)).count()
    }

    fn answer(&self, spec: &CommandSpec, interactive: bool) -> CommandOutput {
        self.calls.lock().unwrap().push(Call {
            spec: spec.clone(),
            interactive,
        });
        let line = spec.to_string();
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::ok(""))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn output(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
        Ok(self.answer(cmd, false))
    }

    async fn interactive(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
        let mut output = self.answer(cmd, true);
        output.stdout.clear();
        output.stderr.clear();
        Ok(output)
    }
}
