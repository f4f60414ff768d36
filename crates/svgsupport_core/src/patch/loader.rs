//! Patch install pipeline: read source, rewrite, hand to the host loader.
//!
//! # Invariants
//! - The existence check runs before any I/O, so a second install of the same
//!   target is a no-op.
//! - The patched text is fully written into its slot before the key reaches
//!   the host.
//! - Every target gets exactly one outcome in the report.

use super::rule::apply_rules;
use super::slots::{VirtualPath, VirtualSlots};
use super::target::{FailurePolicy, PatchTarget};
use super::{PatchError, PatchResult};
use log::{error, info, warn};
use std::time::Instant;
use uuid::Uuid;

/// Host module loader seam.
///
/// Implementations load definitions from a virtual path exactly as they would
/// from a real file. `load_virtual` must obtain the bytes with
/// [`VirtualSlots::take`].
pub trait ModuleHost {
    /// Whether the running process already defines `symbol`.
    fn is_defined(&self, symbol: &str) -> bool;

    fn load_virtual(&mut self, path: &VirtualPath, slots: &mut VirtualSlots) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Someone else loaded the routine first.
    AlreadyDefined,
    /// Best-effort target whose source could not be read.
    SourceUnreadable,
}

#[derive(Debug)]
pub enum TargetOutcome {
    Installed {
        applied: usize,
        /// Rules that matched nothing; the routine loaded without them.
        unmatched: Vec<String>,
    },
    Skipped(SkipReason),
    Failed(PatchError),
}

impl TargetOutcome {
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug)]
pub struct TargetReport {
    pub identifier: String,
    pub outcome: TargetOutcome,
}

/// Result of one `install_all` run.
#[derive(Debug)]
pub struct InstallReport {
    /// Correlates the log lines of one run.
    pub run_id: Uuid,
    pub targets: Vec<TargetReport>,
}

impl InstallReport {
    pub fn get(&self, identifier: &str) -> Option<&TargetOutcome> {
        self.targets
            .iter()
            .find(|report| report.identifier == identifier)
            .map(|report| &report.outcome)
    }

    pub fn installed_count(&self) -> usize {
        self.targets
            .iter()
            .filter(|report| report.outcome.is_installed())
            .count()
    }

    pub fn failures(&self) -> Vec<&TargetReport> {
        self.targets
            .iter()
            .filter(|report| report.outcome.is_failed())
            .collect()
    }

    /// Targets that loaded with at least one rule unmatched.
    pub fn drifted(&self) -> Vec<&TargetReport> {
        self.targets
            .iter()
            .filter(|report| {
                matches!(&report.outcome, TargetOutcome::Installed { unmatched, .. } if !unmatched.is_empty())
            })
            .collect()
    }
}

/// Installs patch targets into a [`ModuleHost`].
#[derive(Debug)]
pub struct PatchLoader {
    slots: VirtualSlots,
}

impl PatchLoader {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            slots: VirtualSlots::new(scheme),
        }
    }

    pub fn slots(&self) -> &VirtualSlots {
        &self.slots
    }

    /// Installs every target, in order, isolating failures per target.
    pub fn install_all<H: ModuleHost + ?Sized>(
        &mut self,
        host: &mut H,
        targets: &[PatchTarget],
    ) -> InstallReport {
        let run_id = Uuid::new_v4();
        let started_at = Instant::now();
        let mut reports = Vec::with_capacity(targets.len());

        for target in targets {
            let outcome = match self.install(host, target, run_id) {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(
                        "event=patch_install module=patch status=error run={} target={} error={}",
                        run_id, target.identifier, err
                    );
                    TargetOutcome::Failed(err)
                }
            };
            reports.push(TargetReport {
                identifier: target.identifier.clone(),
                outcome,
            });
        }

        let report = InstallReport {
            run_id,
            targets: reports,
        };
        info!(
            "event=patch_run module=patch status=ok run={} targets={} installed={} failed={} duration_ms={}",
            run_id,
            targets.len(),
            report.installed_count(),
            report.failures().len(),
            started_at.elapsed().as_millis()
        );
        report
    }

    fn install<H: ModuleHost + ?Sized>(
        &mut self,
        host: &mut H,
        target: &PatchTarget,
        run_id: Uuid,
    ) -> PatchResult<TargetOutcome> {
        target.validate()?;

        if host.is_defined(&target.symbol) {
            info!(
                "event=patch_install module=patch status=skip run={} target={} reason=already_defined",
                run_id, target.identifier
            );
            return Ok(TargetOutcome::Skipped(SkipReason::AlreadyDefined));
        }

        let source = match std::fs::read_to_string(&target.source_path) {
            Ok(source) => source,
            Err(err) if target.policy == FailurePolicy::BestEffort => {
                warn!(
                    "event=patch_install module=patch status=skip run={} target={} reason=source_unreadable path={} error={}",
                    run_id,
                    target.identifier,
                    target.source_path.display(),
                    err
                );
                return Ok(TargetOutcome::Skipped(SkipReason::SourceUnreadable));
            }
            Err(source) => {
                return Err(PatchError::SourceUnreadable {
                    target: target.identifier.clone(),
                    path: target.source_path.clone(),
                    source,
                });
            }
        };

        let patched = apply_rules(&source, &target.rules);
        for rule in &patched.unmatched {
            warn!(
                "event=patch_rule_unmatched module=patch status=warn run={} target={} rule={}",
                run_id, target.identifier, rule
            );
        }

        let path = self
            .slots
            .write(&target.virtual_key, patched.text.into_bytes())?;

        let loaded = host.load_virtual(&path, &mut self.slots);
        let leftover = self.slots.discard(&path);
        if let Err(message) = loaded {
            return Err(PatchError::HostLoad {
                target: target.identifier.clone(),
                message,
            });
        }
        if leftover {
            return Err(PatchError::HostLoad {
                target: target.identifier.clone(),
                message: format!("host never read `{path}`"),
            });
        }

        info!(
            "event=patch_install module=patch status=ok run={} target={} applied={} unmatched={}",
            run_id,
            target.identifier,
            patched.applied.len(),
            patched.unmatched.len()
        );
        Ok(TargetOutcome::Installed {
            applied: patched.applied.len(),
            unmatched: patched.unmatched,
        })
    }
}
