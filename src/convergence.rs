//! The convergence loop: drive repair strategies to a fixed point, one
//! diagnostic per round.
//!
//! Each round classifies the latest build and acts on at most one
//! diagnostic. A diagnostic inside a file rebind itself wrote means the last
//! repair introduced a regression; such files are fixed in place or deleted,
//! never regenerated, so a broken generated file cannot trigger endless
//! regeneration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classifier::{Classification, Diagnostic, classify};
use crate::detector::ChangeDetector;
use crate::dump;
use crate::error::Error;
use crate::guard::SourceGuard;
use crate::strategy::{FixRequest, GenerateRequest, RepairStrategy, ThreadRegistry};
use crate::toolchain::{BuildOutcome, Compiler};

/// Outcome of one convergence round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Round {
    /// Terminal for the loop: compilation is clean, or nothing rebind can do
    /// remains.
    NothingToDo,
    /// Progress was made or a retry is warranted.
    RunAgain,
}

/// The repair loop with its collaborators, wired once at startup in
/// dependency order and never re-resolved.
pub struct RepairLoop<C, S> {
    /// Directory generated bindings land in, inside the guard's root.
    bindings_dir: PathBuf,
    /// The toolchain boundary.
    compiler: C,
    /// Decides whether a recompile is due.
    detector: ChangeDetector,
    /// Mutation discipline for everything under the source root.
    guard: SourceGuard,
    /// Latest build outcome; `None` before the first compile.
    last_outcome: Option<BuildOutcome>,
    /// Build root that diagnostic paths are relative to.
    root: PathBuf,
    /// The pluggable text producer.
    strategy: S,
    /// Per-output-file conversation state handed to the strategy.
    threads: ThreadRegistry,
}

impl<C: Compiler, S: RepairStrategy> RepairLoop<C, S> {
    /// Wire up a loop. `bindings_dir` is where generated bindings land and
    /// must sit inside the guard's root.
    pub fn new(
        root: &Path,
        bindings_dir: &Path,
        compiler: C,
        detector: ChangeDetector,
        guard: SourceGuard,
        strategy: S,
    ) -> Self {
        return Self {
            bindings_dir: bindings_dir.to_path_buf(),
            compiler,
            detector,
            guard,
            last_outcome: None,
            root: root.to_path_buf(),
            strategy,
            threads: ThreadRegistry::new(),
        };
    }

    /// One round: classify the latest build and act on at most one
    /// diagnostic.
    ///
    /// # Errors
    ///
    /// Propagates compiler, guard, and strategy failures. Guard violations
    /// are bugs in the calling strategy and are never swallowed here.
    pub fn round(&mut self) -> Result<Round, Error> {
        let raw = self.latest_output()?;
        let classification = classify(raw.as_deref(), &self.root);

        return match classification {
            Classification::Clean => {
                tracing::info!("no diagnostics; nothing left to do");
                Ok(Round::NothingToDo)
            },
            Classification::Indeterminate => {
                tracing::warn!("compiler output carries no location anchor; retrying later");
                Ok(Round::RunAgain)
            },
            Classification::Found(diagnostic) => self.dispatch(&diagnostic),
        };
    }

    /// Run rounds until `NothingToDo`, pacing by `interval` so the external
    /// compiler is not hammered.
    ///
    /// `max_rounds` bounds the loop; `None` runs to fixed point. Callers
    /// embedding the loop in automated tests must pass a cap.
    ///
    /// # Errors
    ///
    /// Propagates the first round error.
    pub fn run(&mut self, interval: Duration, max_rounds: Option<u32>) -> Result<(), Error> {
        let ticker = crossbeam_channel::tick(interval);
        let mut rounds = 0_u32;
        loop {
            if self.round()? == Round::NothingToDo {
                return Ok(());
            }
            rounds = rounds.saturating_add(1);
            if max_rounds.is_some_and(|cap| return rounds >= cap) {
                tracing::warn!(rounds, "round cap reached before fixed point");
                return Ok(());
            }
            let _ = ticker.recv();
        }
    }

    /// Route one diagnostic to its repair path.
    fn dispatch(&mut self, diagnostic: &Diagnostic) -> Result<Round, Error> {
        tracing::info!(kind = diagnostic.kind(), "{diagnostic}");
        let file = self.root.join(diagnostic.file());

        // A diagnostic inside a file we wrote means the last repair
        // introduced a regression. Repair or delete in place; never re-run
        // generation on it.
        if self.is_managed_probe(&file)? {
            return self.repair_own_file(diagnostic, &file);
        }

        return match diagnostic {
            Diagnostic::MissingModule { module_name, .. } => {
                tracing::info!(module = %module_name, "module missing; trying to generate bindings");
                self.generate_bindings(&file, module_name)
            },
            Diagnostic::MissingValue { module_name, value_name, .. } => {
                tracing::info!(
                    module = %module_name,
                    value = %value_name,
                    "value missing; trying to generate bindings"
                );
                self.generate_bindings(&file, module_name)
            },
            Diagnostic::SyntaxError { .. } => {
                tracing::warn!("syntax error in a file rebind does not own; nothing to do");
                Ok(Round::NothingToDo)
            },
            Diagnostic::Unknown { .. } => {
                tracing::warn!("compilation failing for reasons rebind cannot fix");
                Ok(Round::NothingToDo)
            },
            Diagnostic::WrongType { given_type, wanted_type, .. } => {
                self.repair_wrong_type(&file, given_type, wanted_type)
            },
        };
    }

    /// Dump-parse the offending file and pull out references to the module.
    fn extract_references(
        &mut self,
        file: &Path,
        module_name: &str,
    ) -> Result<Vec<dump::Reference>, Error> {
        let Some(raw) = self.compiler.dump_parse_tree(file)? else {
            // The file compiles standalone, so there is no dump to mine.
            return Ok(Vec::new());
        };
        let tree = dump::parse(&raw)?;
        return Ok(dump::find_references(&tree, module_name));
    }

    /// The generation path: extract references, ask the strategy for a
    /// bindings file, write it through the guard.
    fn generate_bindings(&mut self, file: &Path, module_name: &str) -> Result<Round, Error> {
        let references = self.extract_references(file, module_name)?;
        let source_text = self.guard.read(file)?;
        let bindings_file = self.bindings_dir.join(format!("{module_name}.res"));
        let existing = if self.is_managed_probe(&bindings_file)? {
            Some(self.guard.read(&bindings_file)?)
        } else {
            None
        };
        let raw_output = self.raw_output_or_default();

        let request = GenerateRequest {
            existing_bindings: existing.as_deref(),
            module_name,
            raw_output: &raw_output,
            references: &references,
            source_text: &source_text,
        };
        let Some(text) = self.strategy.generate(&request, &mut self.threads)? else {
            tracing::warn!(
                strategy = self.strategy.name(),
                module = %module_name,
                "strategy declined; stopping"
            );
            return Ok(Round::NothingToDo);
        };

        self.guard.write(&bindings_file, &text, true)?;
        tracing::info!(file = %bindings_file.display(), "wrote generated bindings");
        return Ok(Round::RunAgain);
    }

    /// Tear down the loop and hand back its strategy, so callers can
    /// inspect what it was asked.
    pub fn into_strategy(self) -> S {
        return self.strategy;
    }

    /// Whether a path names a managed file, treating out-of-root paths as
    /// simply not ours rather than as violations. Probing is not mutation.
    fn is_managed_probe(&self, path: &Path) -> Result<bool, Error> {
        return match self.guard.is_managed(path) {
            Ok(managed) => Ok(managed),
            Err(Error::OutOfBounds { .. }) => Ok(false),
            Err(e) => Err(e),
        };
    }

    /// Raw output of the latest build, recompiling only when the tree
    /// changed since the last look. The first round always compiles.
    fn latest_output(&mut self) -> Result<Option<String>, Error> {
        let changed = self.detector.has_changed();
        if changed || self.last_outcome.is_none() {
            self.last_outcome = Some(self.compiler.build()?);
        }
        return match &self.last_outcome {
            Some(BuildOutcome::Failed(raw)) => Ok(Some(raw.clone())),
            _ => Ok(None),
        };
    }

    /// The root module of a printed type, when it resolves to a managed
    /// bindings file.
    fn managed_type_module(&self, type_text: &str) -> Result<Option<String>, Error> {
        let root_module = type_text
            .split('.')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        if root_module.is_empty() {
            return Ok(None);
        }
        let candidate = self.bindings_dir.join(format!("{root_module}.res"));
        if self.is_managed_probe(&candidate)? {
            return Ok(Some(root_module));
        }
        return Ok(None);
    }

    /// Raw text of the last failed build; empty when unavailable.
    fn raw_output_or_default(&self) -> String {
        return match &self.last_outcome {
            Some(BuildOutcome::Failed(raw)) => raw.clone(),
            _ => String::new(),
        };
    }

    /// Handle a diagnostic pointing into a file rebind itself wrote.
    fn repair_own_file(&mut self, diagnostic: &Diagnostic, file: &Path) -> Result<Round, Error> {
        tracing::warn!(file = %file.display(), "a generated file is broken");

        if matches!(diagnostic, Diagnostic::SyntaxError { .. }) {
            self.guard.delete(file)?;
            tracing::info!(file = %file.display(), "deleted unparseable generated file");
            return Ok(Round::RunAgain);
        }

        let current_text = self.guard.read(file)?;
        let raw_output = self.raw_output_or_default();
        let file_name = file
            .file_name()
            .and_then(|name| return name.to_str())
            .unwrap_or_default()
            .to_string();
        let request = FixRequest {
            current_text: &current_text,
            file_name: &file_name,
            raw_output: &raw_output,
        };
        let Some(replacement) = self.strategy.fix(&request, &mut self.threads)? else {
            tracing::warn!(strategy = self.strategy.name(), "strategy declined to fix; stopping");
            return Ok(Round::NothingToDo);
        };

        self.guard.write(file, &replacement, true)?;
        tracing::info!(file = %file.display(), "rewrote broken generated file");
        return Ok(Round::RunAgain);
    }

    /// Tie-break for type errors: only actionable when one side's root
    /// module names a managed bindings file. The given side wins when both
    /// do. Preserved reference behavior, documented rather than optimal.
    fn repair_wrong_type(
        &mut self,
        file: &Path,
        given_type: &str,
        wanted_type: &str,
    ) -> Result<Round, Error> {
        let given = self.managed_type_module(given_type)?;
        let wanted = self.managed_type_module(wanted_type)?;
        let Some(module_name) = given.or(wanted) else {
            tracing::warn!("type error with no generated bindings involved; nothing to do");
            return Ok(Round::NothingToDo);
        };

        tracing::info!(module = %module_name, "type error involves generated bindings; regenerating");
        return self.generate_bindings(file, &module_name);
    }
}
