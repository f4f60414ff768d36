use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use svgsupport_core::gate::{AcceptAll, MessageQueue, UploadValidator};
use svgsupport_core::patch::{
    ConfigStore, OverrideOutcome, OverrideSkip, SkipReason, VirtualPath, VirtualSlots,
};
use svgsupport_core::plugin::{
    EventSubscriber, HostContext, HostEvent, BANNER_HELPER, IMAGE, MEDIA_HELPER, MEDIA_LIST_MODEL,
};
use svgsupport_core::{ModuleHost, SupportConfig, SvgSupportPlugin, TargetOutcome, UploadedFile};

const LIST_MODEL: &str = "<?php\nswitch ($ext) {\ncase 'jpg':\n$info = @getimagesize($tmp->path);\n}\n";
const MEDIA_HELPER_SRC: &str = "<?php\nclass MediaHelper {\n$allowable = 'xcf|odg|gif|jpg|jpeg|png|bmp|webp';\n$images = array_map('trim', explode(',', $params->get('image_extensions')));\n}\n";
const BANNER_HELPER_SRC: &str = "<?php\nreturn preg_match('#\\.(?:bmp|gif|jpe?g|png|webp)$#i', $url);\n";
const IMAGE_SRC: &str = "<?php\nclass Image {\n$info = getimagesize($path);\n}\n";

/// Module host that defines a routine's symbol once its virtual source loads.
#[derive(Default)]
struct HostRuntime {
    defined: BTreeSet<String>,
    loaded: BTreeMap<String, String>,
}

impl ModuleHost for HostRuntime {
    fn is_defined(&self, symbol: &str) -> bool {
        self.defined.contains(symbol)
    }

    fn load_virtual(&mut self, path: &VirtualPath, slots: &mut VirtualSlots) -> Result<(), String> {
        let bytes = slots.take(path).map_err(|err| err.to_string())?;
        let symbol = match path.key() {
            "MediaModelList.php" => "MediaModelList",
            "MediaHelper.php" => "Joomla\\CMS\\Helper\\MediaHelper",
            "BannerHelper.php" => "Joomla\\Component\\Banners\\Site\\Helper\\BannerHelper",
            "Image.php" => "Joomla\\CMS\\Image\\Image",
            other => return Err(format!("unknown module `{other}`")),
        };
        self.defined.insert(symbol.to_string());
        self.loaded
            .insert(path.key().to_string(), String::from_utf8(bytes).map_err(|err| err.to_string())?);
        Ok(())
    }
}

#[derive(Default)]
struct OptionStore {
    components: BTreeSet<String>,
    values: BTreeMap<(String, String), String>,
}

impl OptionStore {
    fn with_media(image_extensions: &str) -> Self {
        let mut store = Self::default();
        store.components.insert("com_media".to_string());
        store.values.insert(
            ("com_media".to_string(), "image_extensions".to_string()),
            image_extensions.to_string(),
        );
        store
    }

    fn value(&self, key: &str) -> Option<&str> {
        self.values
            .get(&("com_media".to_string(), key.to_string()))
            .map(String::as_str)
    }
}

impl ConfigStore for OptionStore {
    fn has_component(&self, component: &str) -> bool {
        self.components.contains(component)
    }

    fn get(&self, component: &str, key: &str) -> Option<String> {
        self.values
            .get(&(component.to_string(), key.to_string()))
            .cloned()
    }

    fn set(&mut self, component: &str, key: &str, value: &str) -> Result<(), String> {
        self.values
            .insert((component.to_string(), key.to_string()), value.to_string());
        Ok(())
    }
}

fn host_tree(root: &Path, with_list_model: bool) {
    let files = [
        ("administrator/components/com_media/models/list.php", LIST_MODEL),
        ("libraries/src/Helper/MediaHelper.php", MEDIA_HELPER_SRC),
        ("components/com_banners/src/Helper/BannerHelper.php", BANNER_HELPER_SRC),
        ("libraries/src/Image/Image.php", IMAGE_SRC),
    ];
    for (relative, contents) in files {
        if relative.ends_with("list.php") && !with_list_model {
            continue;
        }
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }
}

fn config_for(root: &Path) -> SupportConfig {
    let mut config = SupportConfig::default();
    config.host.root = root.to_path_buf();
    config
}

#[test]
fn boot_patches_all_routines_and_extends_media_options() {
    let dir = tempfile::tempdir().unwrap();
    host_tree(dir.path(), true);
    let mut plugin = SvgSupportPlugin::new(config_for(dir.path()));
    let mut runtime = HostRuntime::default();
    let mut store = OptionStore::with_media("bmp,gif,jpg,png");

    let report = plugin
        .handle(
            HostEvent::AfterInitialise,
            &mut HostContext::new(&mut runtime, &mut store),
        )
        .expect("subscribed event");

    assert_eq!(report.install.installed_count(), 4);
    assert!(report.install.drifted().is_empty());
    assert_eq!(report.image_extensions_pipe, "bmp|gif|jpg|png|svg|webp|jpeg|SVG");
    assert!(report.warnings.is_empty());

    let helper = &runtime.loaded["MediaHelper.php"];
    assert!(helper.contains("'bmp|gif|jpg|png|svg|webp|jpeg|SVG'"));
    assert!(helper.contains("if (!\\SvgSupport\\Gate::sanitizeUpload($file)) {"));
    assert!(runtime.loaded["MediaModelList.php"].contains("case 'jpg':\ncase 'svg':"));
    assert!(runtime.loaded["BannerHelper.php"].contains("(?:bmp|gif|jpg|png|svg|webp|jpeg|SVG)$"));
    assert!(runtime.loaded["Image.php"].contains("\\SvgSupport\\Gate::isProtected($path)"));

    assert_eq!(report.applied_overrides(), 3);
    assert_eq!(store.value("image_extensions"), Some("bmp,gif,jpg,png,svg"));
    assert!(store.value("upload_extensions").unwrap().ends_with(",XLS,SVG,svg"));
    assert!(store
        .value("upload_mime")
        .unwrap()
        .ends_with(",application/x-zip,image/svg+xml,application/svg+xml"));
}

#[test]
fn booting_twice_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    host_tree(dir.path(), true);
    let mut plugin = SvgSupportPlugin::new(config_for(dir.path()));
    let mut runtime = HostRuntime::default();
    let mut store = OptionStore::with_media("bmp,gif,jpg,png");

    plugin.boot(&mut HostContext::new(&mut runtime, &mut store));
    let options_after_first = store.values.clone();
    let second = plugin.boot(&mut HostContext::new(&mut runtime, &mut store));

    for id in [MEDIA_LIST_MODEL, MEDIA_HELPER, BANNER_HELPER, IMAGE] {
        assert!(matches!(
            second.install.get(id),
            Some(TargetOutcome::Skipped(SkipReason::AlreadyDefined))
        ));
    }
    assert!(second
        .overrides
        .iter()
        .all(|(_, outcome)| *outcome == OverrideOutcome::Skipped(OverrideSkip::AlreadyPresent)));
    assert_eq!(store.values, options_after_first);
}

#[test]
fn missing_legacy_list_model_does_not_fail_boot() {
    let dir = tempfile::tempdir().unwrap();
    host_tree(dir.path(), false);
    let mut plugin = SvgSupportPlugin::new(config_for(dir.path()));
    let mut runtime = HostRuntime::default();
    let mut store = OptionStore::with_media("bmp,gif,jpg,png");

    let report = plugin.boot(&mut HostContext::new(&mut runtime, &mut store));

    assert!(matches!(
        report.install.get(MEDIA_LIST_MODEL),
        Some(TargetOutcome::Skipped(SkipReason::SourceUnreadable))
    ));
    assert_eq!(report.install.installed_count(), 3);
    assert!(report.install.failures().is_empty());
}

#[test]
fn missing_media_component_skips_overrides_and_uses_default_extensions() {
    let dir = tempfile::tempdir().unwrap();
    host_tree(dir.path(), true);
    let mut plugin = SvgSupportPlugin::new(config_for(dir.path()));
    let mut runtime = HostRuntime::default();
    let mut store = OptionStore::default();

    let report = plugin.boot(&mut HostContext::new(&mut runtime, &mut store));

    assert_eq!(report.image_extensions_pipe, "bmp|gif|jpg|jpeg|png|webp|svg|SVG");
    assert!(report
        .overrides
        .iter()
        .all(|(_, outcome)| *outcome == OverrideOutcome::Skipped(OverrideSkip::ComponentMissing)));
    assert!(store.values.is_empty());
}

#[test]
fn unrelated_events_are_ignored() {
    let mut plugin = SvgSupportPlugin::new(SupportConfig::default());
    let mut runtime = HostRuntime::default();
    let mut store = OptionStore::default();

    assert_eq!(plugin.subscribed_events(), &[HostEvent::AfterInitialise]);
    let outcome = plugin.handle(
        HostEvent::AfterRoute,
        &mut HostContext::new(&mut runtime, &mut store),
    );
    assert!(outcome.is_none());
    assert!(runtime.loaded.is_empty());
    assert_eq!(HostEvent::AfterInitialise.as_str(), "onAfterInitialise");
}

#[test]
fn language_file_overrides_reject_messages() {
    let dir = tempfile::tempdir().unwrap();
    host_tree(dir.path(), true);
    let language = dir.path().join("en-GB.plg_system_svgsupport.ini");
    std::fs::write(&language, "SVGSUPPORT_ERR_INVALID_FILE=\"That SVG is not welcome here\"\n").unwrap();
    let mut config = config_for(dir.path());
    config.host.language_file = Some(language);
    let mut plugin = SvgSupportPlugin::new(config);

    let report = plugin.boot(&mut HostContext::new(
        &mut HostRuntime::default(),
        &mut OptionStore::default(),
    ));
    assert!(report.warnings.is_empty());

    let temp_path = dir.path().join("php-upload");
    std::fs::write(&temp_path, "<svg><g></svg>").unwrap();
    let file = UploadedFile::new("broken.svg", &temp_path);
    let mut messages = MessageQueue::new();
    assert!(!plugin.upload_gate(AcceptAll).validate(&file, &mut messages));
    assert_eq!(
        messages.errors().collect::<Vec<_>>(),
        vec!["That SVG is not welcome here"]
    );
}

#[test]
fn unreadable_language_file_is_a_warning_only() {
    let dir = tempfile::tempdir().unwrap();
    host_tree(dir.path(), true);
    let mut config = config_for(dir.path());
    config.host.language_file = Some(dir.path().join("missing.ini"));
    let mut plugin = SvgSupportPlugin::new(config);

    let report = plugin.boot(&mut HostContext::new(
        &mut HostRuntime::default(),
        &mut OptionStore::default(),
    ));

    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.install.installed_count(), 4);
    assert_eq!(plugin.catalog().len(), 3);
}
