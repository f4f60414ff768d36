//! Host-facing plugin shell.
//!
//! # Responsibility
//! - Subscribe to host initialisation and run the boot sequence once per
//!   request: language strings, patch install, option overrides.
//! - Hand the content gate to patched host routines.
//!
//! # Invariants
//! - Boot never fails as a whole; each step reports its own outcome.
//! - Booting twice in one process is a no-op for already-loaded routines.

use crate::config::SupportConfig;
use crate::gate::{image_extensions_pipe, ContentGate, SvgUploadGate, UploadValidator};
use crate::language::LanguageCatalog;
use crate::patch::{
    apply_overrides, media_option_overrides, InstallReport, OverrideOutcome, PatchLoader,
};
use log::{info, warn};
use std::time::Instant;

pub mod events;
pub mod targets;

pub use events::{EventSubscriber, HostContext, HostEvent};
pub use targets::{default_targets, BANNER_HELPER, IMAGE, MEDIA_HELPER, MEDIA_LIST_MODEL};

const SUBSCRIBED: [HostEvent; 1] = [HostEvent::AfterInitialise];

/// Everything one boot run did.
#[derive(Debug)]
pub struct BootReport {
    pub install: InstallReport,
    pub overrides: Vec<(String, OverrideOutcome)>,
    /// Image extension list the patched helpers were built with.
    pub image_extensions_pipe: String,
    /// Non-fatal problems outside the install report.
    pub warnings: Vec<String>,
}

impl BootReport {
    pub fn applied_overrides(&self) -> usize {
        self.overrides
            .iter()
            .filter(|(_, outcome)| matches!(outcome, OverrideOutcome::Applied(_)))
            .count()
    }
}

pub struct SvgSupportPlugin {
    config: SupportConfig,
    loader: PatchLoader,
    gate: ContentGate,
    catalog: LanguageCatalog,
}

impl SvgSupportPlugin {
    pub fn new(config: SupportConfig) -> Self {
        let gate = ContentGate::new(config.clone());
        Self::with_gate(config, gate)
    }

    /// Uses a pre-built gate, e.g. one without a content sniffer.
    pub fn with_gate(config: SupportConfig, gate: ContentGate) -> Self {
        Self {
            loader: PatchLoader::new(config.host.virtual_scheme.clone()),
            config,
            gate,
            catalog: LanguageCatalog::builtin_en(),
        }
    }

    pub fn config(&self) -> &SupportConfig {
        &self.config
    }

    pub fn gate(&self) -> &ContentGate {
        &self.gate
    }

    pub fn catalog(&self) -> &LanguageCatalog {
        &self.catalog
    }

    pub fn loader(&self) -> &PatchLoader {
        &self.loader
    }

    /// Upload validator for the patched media helper, translating rejects
    /// with the loaded language strings.
    pub fn upload_gate<V: UploadValidator>(&self, inner: V) -> SvgUploadGate<V, &LanguageCatalog> {
        self.gate.upload_gate(inner, &self.catalog)
    }

    pub fn boot(&mut self, context: &mut HostContext<'_>) -> BootReport {
        let started_at = Instant::now();
        let mut warnings = Vec::new();

        if let Some(path) = self.config.host.language_file.clone() {
            match LanguageCatalog::load(&path) {
                Ok(extra) => self.catalog.merge(extra),
                Err(err) => {
                    warn!(
                        "event=plugin_boot module=plugin status=warn step=language error={}",
                        crate::logging::single_line(&err.to_string(), 160)
                    );
                    warnings.push(err.to_string());
                }
            }
        }

        let component = self.config.host.media_component.clone();
        let configured = context
            .options
            .get(&component, "image_extensions")
            .unwrap_or_else(|| self.config.default_image_extensions.clone());
        let pipe = image_extensions_pipe(&configured);

        let targets = match default_targets(&self.config, &pipe) {
            Ok(targets) => targets,
            Err(err) => {
                warn!(
                    "event=plugin_boot module=plugin status=warn step=targets error={}",
                    crate::logging::single_line(&err.to_string(), 160)
                );
                warnings.push(err.to_string());
                Vec::new()
            }
        };
        let install = self.loader.install_all(&mut *context.modules, &targets);
        let overrides = apply_overrides(&mut *context.options, &media_option_overrides(&component));

        let report = BootReport {
            install,
            overrides,
            image_extensions_pipe: pipe,
            warnings,
        };
        info!(
            "event=plugin_boot module=plugin status=ok run_id={} installed={} failed={} overrides_applied={} duration_ms={}",
            report.install.run_id,
            report.install.installed_count(),
            report.install.failures().len(),
            report.applied_overrides(),
            started_at.elapsed().as_millis()
        );
        report
    }
}

impl EventSubscriber for SvgSupportPlugin {
    type Output = BootReport;

    fn subscribed_events(&self) -> &'static [HostEvent] {
        &SUBSCRIBED
    }

    fn handle(&mut self, event: HostEvent, context: &mut HostContext<'_>) -> Option<BootReport> {
        if !self.subscribed_events().contains(&event) {
            return None;
        }
        Some(self.boot(context))
    }
}

impl std::fmt::Debug for SvgSupportPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvgSupportPlugin")
            .field("config", &self.config)
            .field("gate", &self.gate)
            .field("catalog_entries", &self.catalog.len())
            .finish()
    }
}
