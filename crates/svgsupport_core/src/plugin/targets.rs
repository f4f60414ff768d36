//! Host routines patched at boot.
//!
//! Paths are relative to `host.root`. Replacement snippets are host-language
//! source; `{gate}` stands for `host.gate_symbol` and `{pipe}` for the
//! merged image extension list.

use crate::config::SupportConfig;
use crate::patch::{PatchResult, PatchRule, PatchTarget};

pub const MEDIA_LIST_MODEL: &str = "media.list_model";
pub const MEDIA_HELPER: &str = "media.helper";
pub const BANNER_HELPER: &str = "banners.helper";
pub const IMAGE: &str = "image";

const LIST_MODEL_SIZE_CALL: &str = "$info = @getimagesize($tmp->path);";
const LIST_MODEL_SIZE_REPLACEMENT: &str = "$info = {gate}::legacySize($tmp->path);";

const MEDIA_HELPER_EXTENSIONS: &str = "'xcf|odg|gif|jpg|jpeg|png|bmp|webp'";
const MEDIA_HELPER_IMAGES_LINE: &str =
    "$images = array_map('trim', explode(',', $params->get('image_extensions')));";
const MEDIA_HELPER_SANITIZE: &str = "if (!{gate}::sanitizeUpload($file)) {
	return false;
}

$images = array_map('trim', explode(',', $params->get('image_extensions')));";

const BANNER_HELPER_EXTENSIONS: &str = "bmp|gif|jpe?g|png|webp";

const IMAGE_SIZE_CALL: &str = "$info = getimagesize($path);";
const IMAGE_SIZE_REPLACEMENT: &str = "if ({gate}::isProtected($path)) {
	return (object) {gate}::imageInfo($path);
}

$info = getimagesize($path);";

/// Builds the four boot targets for `config`'s host tree.
pub fn default_targets(
    config: &SupportConfig,
    image_extensions_pipe: &str,
) -> PatchResult<Vec<PatchTarget>> {
    let root = &config.host.root;
    let expand = |snippet: &str| {
        snippet
            .replace("{gate}", &config.host.gate_symbol)
            .replace("{pipe}", image_extensions_pipe)
    };

    Ok(vec![
        PatchTarget::new(
            MEDIA_LIST_MODEL,
            "MediaModelList",
            root.join("administrator/components/com_media/models/list.php"),
            "MediaModelList.php",
        )
        .with_rule(PatchRule::literal("case 'jpg':", "case 'jpg':\ncase 'svg':")?)
        .with_rule(PatchRule::literal(
            LIST_MODEL_SIZE_CALL,
            expand(LIST_MODEL_SIZE_REPLACEMENT),
        )?)
        .best_effort(),
        PatchTarget::new(
            MEDIA_HELPER,
            "Joomla\\CMS\\Helper\\MediaHelper",
            root.join("libraries/src/Helper/MediaHelper.php"),
            "MediaHelper.php",
        )
        .with_rule(PatchRule::literal(MEDIA_HELPER_EXTENSIONS, expand("'{pipe}'"))?)
        .with_rule(PatchRule::literal(
            MEDIA_HELPER_IMAGES_LINE,
            expand(MEDIA_HELPER_SANITIZE),
        )?),
        PatchTarget::new(
            BANNER_HELPER,
            "Joomla\\Component\\Banners\\Site\\Helper\\BannerHelper",
            root.join("components/com_banners/src/Helper/BannerHelper.php"),
            "BannerHelper.php",
        )
        .with_rule(PatchRule::literal(BANNER_HELPER_EXTENSIONS, expand("{pipe}"))?),
        PatchTarget::new(
            IMAGE,
            "Joomla\\CMS\\Image\\Image",
            root.join("libraries/src/Image/Image.php"),
            "Image.php",
        )
        .with_rule(PatchRule::literal(IMAGE_SIZE_CALL, expand(IMAGE_SIZE_REPLACEMENT))?),
    ])
}

#[cfg(test)]
mod tests {
    use super::{default_targets, BANNER_HELPER, IMAGE, MEDIA_HELPER, MEDIA_LIST_MODEL};
    use crate::config::SupportConfig;
    use crate::patch::{apply_rules, FailurePolicy};

    #[test]
    fn table_lists_four_valid_targets() {
        let targets = default_targets(&SupportConfig::default(), "png|svg").unwrap();
        let ids: Vec<_> = targets.iter().map(|target| target.identifier.as_str()).collect();
        assert_eq!(ids, vec![MEDIA_LIST_MODEL, MEDIA_HELPER, BANNER_HELPER, IMAGE]);
        for target in &targets {
            target.validate().expect("valid target");
        }
        assert_eq!(targets[0].policy, FailurePolicy::BestEffort);
        assert!(targets[1..].iter().all(|target| target.policy == FailurePolicy::Required));
    }

    #[test]
    fn paths_resolve_against_host_root() {
        let mut config = SupportConfig::default();
        config.host.root = "/srv/site".into();
        let targets = default_targets(&config, "svg").unwrap();
        assert!(targets[3]
            .source_path
            .ends_with("libraries/src/Image/Image.php"));
        assert!(targets[3].source_path.starts_with("/srv/site"));
    }

    #[test]
    fn banner_rule_swaps_in_the_pipe() {
        let targets = default_targets(&SupportConfig::default(), "bmp|gif|svg|SVG").unwrap();
        let source = "preg_match('#\\.(?:bmp|gif|jpe?g|png|webp)$#i', $url)";
        let patched = apply_rules(source, &targets[2].rules);
        assert_eq!(patched.text, "preg_match('#\\.(?:bmp|gif|svg|SVG)$#i', $url)");
        assert!(patched.unmatched.is_empty());
    }

    #[test]
    fn image_rule_calls_configured_gate() {
        let mut config = SupportConfig::default();
        config.host.gate_symbol = "\\Acme\\Gate".to_string();
        let targets = default_targets(&config, "svg").unwrap();
        let patched = apply_rules("{\n$info = getimagesize($path);\n}", &targets[3].rules);
        assert!(patched.text.contains("if (\\Acme\\Gate::isProtected($path))"));
        assert!(patched.text.ends_with("$info = getimagesize($path);\n}"));
    }
}
