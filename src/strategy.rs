//! Pluggable repair strategies and their conversation state.
//!
//! A strategy is a producer of replacement source text: the loop classifies
//! and routes, the guard writes, the strategy only decides what the new file
//! should say, or declines. Network-backed strategies (an AI assistant, a
//! registry scraper) plug in through the same trait as the in-tree table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::dump::Reference;
use crate::error::Error;

/// Who authored a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The strategy's backing producer.
    Assistant,
    /// The loop, on behalf of the project.
    User,
}

/// One message in a per-file conversation thread.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message text.
    pub body: String,
    /// Message author.
    pub role: Role,
}

/// One multi-turn conversation about a single output file.
#[derive(Debug, Default)]
pub struct Thread {
    /// Messages in the order they were added.
    messages: Vec<Message>,
}

impl Thread {
    /// All messages in order.
    pub fn messages(&self) -> &[Message] {
        return &self.messages;
    }

    /// Append a message.
    pub fn push(&mut self, role: Role, body: String) {
        self.messages.push(Message { body, role });
        return;
    }
}

/// Conversation threads keyed by intended output filename, the only
/// long-lived state a strategy keeps between rounds. Lets a strategy
/// continue a multi-turn exchange about the same target file.
#[derive(Debug, Default)]
pub struct ThreadRegistry {
    /// Threads by output filename, e.g. `Lodash.res`.
    threads: HashMap<String, Thread>,
}

impl ThreadRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        return Self::default();
    }

    /// Fetch or create the thread for `name`; the flag reports whether it
    /// was just created.
    pub fn thread(&mut self, name: &str) -> (&mut Thread, bool) {
        let is_new = !self.threads.contains_key(name);
        let thread = self.threads.entry(name.to_string()).or_default();
        return (thread, is_new);
    }
}

/// Everything a strategy sees when repairing a managed file it produced.
pub struct FixRequest<'a> {
    /// Current text of the broken managed file, cookie stripped.
    pub current_text: &'a str,
    /// Name of the file being repaired, e.g. `Lodash.res`.
    pub file_name: &'a str,
    /// Raw compiler output for the failing build.
    pub raw_output: &'a str,
}

/// Everything a strategy sees when generating bindings for a missing module.
pub struct GenerateRequest<'a> {
    /// Current bindings text, when a previous round already wrote some.
    pub existing_bindings: Option<&'a str>,
    /// The module the compiler could not find.
    pub module_name: &'a str,
    /// Raw compiler output for the failing build.
    pub raw_output: &'a str,
    /// Identifier references to the module, in document order.
    pub references: &'a [Reference],
    /// Text of the source file that failed to compile, cookie stripped.
    pub source_text: &'a str,
}

/// A pluggable producer of replacement source text. `Ok(None)` means the
/// strategy declines; the loop then stops rather than retrying the same
/// diagnostic forever.
pub trait RepairStrategy {
    /// Produce a corrected version of an existing managed file.
    ///
    /// # Errors
    ///
    /// Implementations surface their own transport or I/O failures.
    fn fix(
        &mut self,
        request: &FixRequest<'_>,
        threads: &mut ThreadRegistry,
    ) -> Result<Option<String>, Error>;

    /// Produce a complete bindings file for a missing module.
    ///
    /// # Errors
    ///
    /// Implementations surface their own transport or I/O failures.
    fn generate(
        &mut self,
        request: &GenerateRequest<'_>,
        threads: &mut ThreadRegistry,
    ) -> Result<Option<String>, Error>;

    /// Short name used in log lines.
    fn name(&self) -> &'static str;
}

/// Ready-made bindings served from a directory holding one `<Module>.res`
/// per known module. Declines modules it has no file for, and declines all
/// fix requests, since a static table cannot iterate on its own output.
pub struct KnownBindings {
    /// Directory of ready-made bindings files.
    dir: PathBuf,
}

impl KnownBindings {
    /// Create a table backed by `dir`.
    pub fn new(dir: &Path) -> Self {
        return Self {
            dir: dir.to_path_buf(),
        };
    }

    /// Path that would hold ready-made bindings for `module_name`.
    fn entry_path(&self, module_name: &str) -> PathBuf {
        return self.dir.join(format!("{module_name}.res"));
    }
}

impl RepairStrategy for KnownBindings {
    fn fix(
        &mut self,
        request: &FixRequest<'_>,
        _threads: &mut ThreadRegistry,
    ) -> Result<Option<String>, Error> {
        tracing::debug!(file = request.file_name, "static table cannot fix its own output");
        return Ok(None);
    }

    fn generate(
        &mut self,
        request: &GenerateRequest<'_>,
        threads: &mut ThreadRegistry,
    ) -> Result<Option<String>, Error> {
        let path = self.entry_path(request.module_name);
        let Ok(text) = std::fs::read_to_string(&path) else {
            tracing::debug!(module = request.module_name, "no ready-made bindings");
            return Ok(None);
        };

        let file_name = format!("{}.res", request.module_name);
        let (thread, _) = threads.thread(&file_name);
        thread.push(
            Role::User,
            format!(
                "bindings for {} requested ({} references)",
                request.module_name,
                request.references.len()
            ),
        );
        thread.push(Role::Assistant, text.clone());

        tracing::info!(module = request.module_name, "serving ready-made bindings");
        return Ok(Some(text));
    }

    fn name(&self) -> &'static str {
        return "known-bindings";
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;

    #[test]
    fn registry_reuses_threads_by_name() {
        let mut registry = ThreadRegistry::new();

        let (thread, is_new) = registry.thread("Lodash.res");
        assert!(is_new);
        thread.push(Role::User, "first".to_string());

        let (thread, is_new) = registry.thread("Lodash.res");
        assert!(!is_new);
        assert_eq!(thread.messages().len(), 1);

        let (_, is_new) = registry.thread("Dayjs.res");
        assert!(is_new);
    }

    #[test]
    fn known_bindings_serves_what_it_has_and_declines_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Lodash.res"), "type t\n").unwrap();

        let mut strategy = KnownBindings::new(dir.path());
        let mut threads = ThreadRegistry::new();

        let request = GenerateRequest {
            existing_bindings: None,
            module_name: "Lodash",
            raw_output: "",
            references: &[],
            source_text: "",
        };
        assert_eq!(
            strategy.generate(&request, &mut threads).unwrap(),
            Some("type t\n".to_string())
        );

        let request = GenerateRequest {
            existing_bindings: None,
            module_name: "Dayjs",
            raw_output: "",
            references: &[],
            source_text: "",
        };
        assert_eq!(strategy.generate(&request, &mut threads).unwrap(), None);
    }

    #[test]
    fn known_bindings_never_fixes() {
        let dir = tempfile::tempdir().unwrap();
        let mut strategy = KnownBindings::new(dir.path());
        let mut threads = ThreadRegistry::new();
        let request = FixRequest {
            current_text: "broken",
            file_name: "Lodash.res",
            raw_output: "",
        };
        assert_eq!(strategy.fix(&request, &mut threads).unwrap(), None);
    }
}
