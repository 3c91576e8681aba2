//! Image post-processing and output nodes.

use super::Contribution;
use crate::graph::context::Context;
use crate::graph::error::{CompileError, CompileResult};
use crate::graph::nodes::settings::MIN_RESOLUTION;
use crate::graph::socket::{SocketDescriptor, SocketKind};
use crate::host::ImageSettings;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Context key of the combine options.
pub const IMAGE_COMBINE: &str = "ImageCombine";
/// Context key of the save options.
pub const SAVE_CONFIG: &str = "SaveConfig";

/// Default file name pattern.
pub const DEFAULT_NAME_FORMAT: &str = "{obj_name}_{bake_pass}";

pub static COMBINE_INPUTS: &[SocketDescriptor] =
    &[SocketDescriptor::input("Image", SocketKind::Image)];
pub static COMBINE_OUTPUTS: &[SocketDescriptor] =
    &[SocketDescriptor::output("Image", SocketKind::Image)];
pub static SAVE_INPUTS: &[SocketDescriptor] = &[SocketDescriptor::input("Image", SocketKind::Image)];

/// Composite every target's image of one (category, pass) into one canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageCombine {
    pub combine: bool,
    pub resize: bool,
    pub output_resolution: [u32; 2],
}

impl Default for ImageCombine {
    fn default() -> Self {
        Self {
            combine: true,
            resize: false,
            output_resolution: [512, 512],
        }
    }
}

impl ImageCombine {
    pub fn contribute(&self, site: &Contribution, ctx: &mut Context) -> CompileResult<()> {
        if !self.combine || !site.is_linked(0) {
            return Ok(());
        }
        if self.output_resolution.iter().any(|&side| side < MIN_RESOLUTION) {
            return Err(CompileError::invalid(
                site.node,
                format!("output_resolution below {MIN_RESOLUTION}"),
            ));
        }
        ctx.insert(
            IMAGE_COMBINE,
            json!({
                "combine": self.combine,
                "resize": self.resize,
                "output_resolution": self.output_resolution,
            }),
        );
        Ok(())
    }
}

/// Write every baked image to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveToImage {
    pub directory: String,
    pub separator: String,
    pub name_format: String,
    pub image_settings: ImageSettings,
}

impl Default for SaveToImage {
    fn default() -> Self {
        Self {
            directory: String::new(),
            separator: "_".to_string(),
            name_format: DEFAULT_NAME_FORMAT.to_string(),
            image_settings: ImageSettings::default(),
        }
    }
}

impl SaveToImage {
    pub fn contribute(&self, site: &Contribution, ctx: &mut Context) -> CompileResult<()> {
        let settings = serde_json::to_value(&self.image_settings)
            .map_err(|e| CompileError::invalid(site.node, e.to_string()))?;
        let config = ctx.ensure_map(SAVE_CONFIG);
        config.insert("Directory".into(), json!(self.directory));
        config.insert("Separator".into(), json!(self.separator));
        config.insert("NameFormat".into(), json!(self.name_format));
        config.insert("ImageSettings".into(), settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_requires_linked_input() {
        let mut ctx = Context::new();
        let unlinked = Contribution {
            node: "Combine",
            linked: &[false],
            presets: None,
        };
        ImageCombine::default().contribute(&unlinked, &mut ctx).unwrap();
        assert!(!ctx.contains_key(IMAGE_COMBINE));

        let linked = Contribution {
            node: "Combine",
            linked: &[true],
            presets: None,
        };
        ImageCombine::default().contribute(&linked, &mut ctx).unwrap();
        assert_eq!(
            ctx.get_path(&[IMAGE_COMBINE, "output_resolution"]),
            Some(&json!([512, 512]))
        );
    }

    #[test]
    fn test_save_config_keys() {
        let mut ctx = Context::new();
        let site = Contribution {
            node: "Output",
            linked: &[true],
            presets: None,
        };
        SaveToImage {
            directory: "/tmp/out".into(),
            ..Default::default()
        }
        .contribute(&site, &mut ctx)
        .unwrap();
        assert_eq!(ctx.get_path(&[SAVE_CONFIG, "Directory"]), Some(&json!("/tmp/out")));
        assert_eq!(
            ctx.get_path(&[SAVE_CONFIG, "ImageSettings", "file_format"]),
            Some(&json!("PNG"))
        );
    }
}
