//! `SaveToImage` executor: write every recorded image to disk.

use super::bake::OUT_IMAGES;
use super::combine::COMBINED_IMAGES;
use super::{recorded, ExecutionEnv, ScopeTimer};
use crate::error::{BakeError, Result, ResultExt};
use crate::graph::nodes::output::{DEFAULT_NAME_FORMAT, SAVE_CONFIG};
use crate::graph::Context;
use crate::host::ImageSettings;
use regex::{Captures, Regex};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Results key: paths written, in save order.
pub const SAVED_IMAGES: &str = "SavedImages";

/// `obj_name` used for combined images.
const COMBINED_OBJECT: &str = "Combine";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveExecutor;

impl SaveExecutor {
    pub fn execute(
        &self,
        env: &mut ExecutionEnv<'_>,
        ctx: &mut Context,
        previous: Context,
    ) -> Result<Context> {
        let config = ctx.get(SAVE_CONFIG).and_then(Value::as_object);
        let text = |key: &str| {
            config
                .and_then(|c| c.get(key))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let directory = PathBuf::from(text("Directory"));
        let separator = match text("Separator") {
            s if s.is_empty() => "_".to_string(),
            s => s,
        };
        let name_format = name_format(&text("NameFormat"), &separator);
        let settings: ImageSettings = match config.and_then(|c| c.get("ImageSettings")) {
            Some(value) => serde_json::from_value(value.clone())?,
            None => ImageSettings::default(),
        };
        let extension = settings.file_format.extension();

        let mut entries: Vec<(String, String, String, String)> =
            recorded(ctx, &previous, OUT_IMAGES)
                .into_iter()
                .map(|(obj, cat, pass, name)| (obj.into(), cat.into(), pass.into(), name.into()))
                .collect();
        for (cat, pass, name) in combined(ctx, &previous) {
            entries.push((COMBINED_OBJECT.to_string(), cat, pass, name));
        }
        if entries.is_empty() {
            tracing::info!("{}: no images to save", env.node_name);
            return Ok(Context::new());
        }
        if !directory.as_os_str().is_empty() {
            std::fs::create_dir_all(&directory)
                .with_context(|| format!("Failed to create {:?}", directory))?;
        }

        let scene = env.scene()?;
        let mut saved = Vec::new();
        for (obj_name, bake_cat, bake_pass, image_name) in entries {
            let Some(image) = scene.image(&image_name) else {
                tracing::debug!("Image {} not in scene, skipping", image_name);
                continue;
            };
            let resolution = format!("{}x{}", image.width, image.height);
            let file_stem = format_name(
                &name_format,
                &[
                    ("obj_name", obj_name.as_str()),
                    ("bake_cat", bake_cat.as_str()),
                    ("bake_pass", bake_pass.as_str()),
                    ("resolution", resolution.as_str()),
                ],
            )?;

            let _timer = ScopeTimer::new(format!("Save {}", file_stem));
            let path = directory.join(format!("{}.{}", file_stem, extension));
            remove_existing(&path)?;
            image
                .save(&path, &settings)
                .with_context(|| format!("Failed to save {:?}", path))?;
            tracing::info!("Saved {}", path.display());
            saved.push(Value::String(path.to_string_lossy().into_owned()));
        }

        let mut out = Context::new();
        out.insert(SAVED_IMAGES, Value::Array(saved));
        Ok(out)
    }
}

fn combined(ctx: &Context, previous: &Context) -> Vec<(String, String, String)> {
    let table = previous
        .get(COMBINED_IMAGES)
        .or_else(|| ctx.get(COMBINED_IMAGES))
        .and_then(Value::as_object);
    let mut entries = Vec::new();
    for (cat, by_pass) in table.into_iter().flatten() {
        for (pass, name) in by_pass.as_object().into_iter().flatten() {
            if let Some(name) = name.as_str() {
                entries.push((cat.clone(), pass.clone(), name.to_string()));
            }
        }
    }
    entries
}

fn remove_existing(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// Apply the default and join adjacent fields with `separator`.
pub fn name_format(format: &str, separator: &str) -> String {
    let format = if format.is_empty() {
        DEFAULT_NAME_FORMAT
    } else {
        format
    };
    format.replace("}_{", &format!("}}{}{{", separator))
}

/// Substitute `{key}` fields. Unknown fields and stray braces are an error.
pub fn format_name(format: &str, fields: &[(&str, &str)]) -> Result<String> {
    let field = Regex::new(r"\{([a-zA-Z_]+)\}")
        .map_err(|e| BakeError::Config(format!("bad name field pattern: {}", e)))?;
    let lookup = |key: &str| fields.iter().find(|(k, _)| *k == key).map(|(_, v)| *v);

    if let Some(unknown) = field
        .captures_iter(format)
        .map(|caps| caps[1].to_string())
        .find(|key| lookup(key.as_str()).is_none())
    {
        return Err(BakeError::Config(format!(
            "unknown name format field {{{}}}",
            unknown
        )));
    }
    if field.replace_all(format, "").contains(['{', '}']) {
        return Err(BakeError::Config(format!(
            "unmatched brace in name format {:?}",
            format
        )));
    }

    Ok(field
        .replace_all(format, |caps: &Captures| lookup(&caps[1]).unwrap_or_default())
        .into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ImageBuffer, ImageFileFormat};
    use crate::registry::test_support::Harness;
    use serde_json::json;

    #[test]
    fn test_name_format_separator() {
        assert_eq!(name_format("", "-"), "{obj_name}-{bake_pass}");
        assert_eq!(
            name_format("{obj_name}_{bake_cat}_{bake_pass}", "."),
            "{obj_name}.{bake_cat}.{bake_pass}"
        );
        assert_eq!(name_format("T_{obj_name}", "-"), "T_{obj_name}");
    }

    #[test]
    fn test_format_name_fields() {
        let fields = [("obj_name", "Cube"), ("resolution", "64x64")];
        assert_eq!(
            format_name("{obj_name}_{resolution}", &fields).unwrap(),
            "Cube_64x64"
        );
        assert!(matches!(
            format_name("{nope}", &fields),
            Err(BakeError::Config(_))
        ));
        assert!(format_name("{obj_name", &fields).is_err());
        assert!(format_name("{obj_name}}", &fields).is_err());
        // Values are inserted verbatim, braces included.
        assert_eq!(
            format_name("{obj_name}", &[("obj_name", "{Cube}")]).unwrap(),
            "{Cube}"
        );
        assert_eq!(format_name("plain", &fields).unwrap(), "plain");
    }

    fn save_config(dir: &Path, format: &str) -> Context {
        let mut ctx = Context::new();
        ctx.insert(
            SAVE_CONFIG,
            json!({
                "Directory": dir.to_string_lossy(),
                "Separator": "-",
                "NameFormat": format,
                "ImageSettings": {"file_format": "PNG", "color_mode": "RGBA", "color_depth": 8},
            }),
        );
        ctx
    }

    #[test]
    fn test_saves_recorded_images() {
        let harness = Harness::new(&[]);
        harness
            .scene
            .lock()
            .unwrap()
            .insert_image(ImageBuffer::filled("Cube_PBR_Albedo", 8, 4, [1.0, 0.5, 0.0, 1.0]));
        let out_dir = harness.dir.path().join("out");
        let mut ctx = save_config(&out_dir, "{obj_name}_{bake_cat}_{bake_pass}_{resolution}");
        let mut previous = Context::new();
        previous.insert(
            OUT_IMAGES,
            json!({"Cube": {"PBR": {"Albedo": "Cube_PBR_Albedo", "AO": "Missing"}}}),
        );

        let mut env = harness.env("Save");
        let out = SaveExecutor.execute(&mut env, &mut ctx, previous).unwrap();

        let expected = out_dir.join("Cube-PBR-Albedo-8x4.png");
        assert_eq!(
            out.get(SAVED_IMAGES),
            Some(&json!([expected.to_string_lossy()]))
        );
        let decoded = image::open(&expected).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 4));
    }

    #[test]
    fn test_replaces_existing_file_and_saves_combined() {
        let harness = Harness::new(&[]);
        harness
            .scene
            .lock()
            .unwrap()
            .insert_image(ImageBuffer::filled("Internal_AO_Combine", 4, 4, [0.2; 4]));
        let out_dir = harness.dir.path().to_path_buf();
        let target = out_dir.join("Combine-AO.png");
        std::fs::write(&target, b"stale").unwrap();

        let mut ctx = save_config(&out_dir, "");
        ctx.insert(COMBINED_IMAGES, json!({"Internal": {"AO": "Internal_AO_Combine"}}));
        let mut env = harness.env("Save");
        SaveExecutor
            .execute(&mut env, &mut ctx, Context::new())
            .unwrap();

        assert!(image::open(&target).is_ok());
    }

    #[test]
    fn test_extension_follows_format() {
        assert_eq!(ImageFileFormat::OpenExr.extension(), "exr");
        assert_eq!(ImageFileFormat::Targa.extension(), "tga");
    }

    #[test]
    fn test_nothing_recorded_is_empty_result() {
        let harness = Harness::new(&[]);
        let mut ctx = save_config(harness.dir.path(), "");
        let mut env = harness.env("Save");
        let out = SaveExecutor
            .execute(&mut env, &mut ctx, Context::new())
            .unwrap();
        assert!(out.is_empty());
    }
}
