//! `ImageCombine` executor: composite every target's image of one
//! (category, pass) onto a shared canvas.

use super::bake::OUT_IMAGES;
use super::{recorded, ExecutionEnv};
use crate::error::Result;
use crate::graph::nodes::output::IMAGE_COMBINE;
use crate::graph::nodes::settings::resolution_of;
use crate::graph::Context;
use crate::host::ImageBuffer;
use serde_json::Value;

/// Results key: `CombinedImages.<cat>.<pass> = image name`.
pub const COMBINED_IMAGES: &str = "CombinedImages";

const BACKGROUND: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
/// Flat tangent-space normal.
const NORMAL_BACKGROUND: [f32; 4] = [0.501_960_8, 0.501_960_8, 1.0, 1.0];
const OVERLAY_THRESHOLD: f32 = 1e-6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CombineExecutor;

impl CombineExecutor {
    pub fn execute(
        &self,
        env: &mut ExecutionEnv<'_>,
        ctx: &mut Context,
        previous: Context,
    ) -> Result<Context> {
        let Some(options) = ctx.get(IMAGE_COMBINE).and_then(Value::as_object) else {
            tracing::debug!("{}: combine disabled", env.node_name);
            return Ok(Context::new());
        };
        if !options.get("combine").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(Context::new());
        }
        let resize = options
            .get("resize")
            .and_then(Value::as_bool)
            .unwrap_or(false)
            .then(|| output_resolution(options.get("output_resolution")))
            .flatten();
        let (width, height) = resolution_of(ctx).unwrap_or((512, 512));

        // (cat, pass) → image names, in first-seen order.
        let mut groups: Vec<((String, String), Vec<String>)> = Vec::new();
        for (_, cat, pass, name) in recorded(ctx, &previous, OUT_IMAGES) {
            let key = (cat.to_string(), pass.to_string());
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, names)) => names.push(name.to_string()),
                None => groups.push((key, vec![name.to_string()])),
            }
        }

        let mut out = Context::new();
        let mut scene = env.scene()?;
        for ((cat, pass), names) in groups {
            if names.len() < 2 {
                tracing::debug!("{}/{}: single image, nothing to combine", cat, pass);
                continue;
            }
            let background = if pass.ends_with("Normal") || pass.ends_with("NORMAL") {
                NORMAL_BACKGROUND
            } else {
                BACKGROUND
            };
            let combined_name = format!("{}_{}_Combine", cat, pass);
            let mut canvas = ImageBuffer::filled(combined_name.clone(), width, height, background);

            for name in &names {
                let Some(image) = scene.image(name) else {
                    tracing::warn!("Image {} missing, not combined", name);
                    continue;
                };
                if image.size() == (width, height) {
                    overlay(&mut canvas, image, background);
                } else {
                    tracing::warn!(
                        "Image {} is {}x{}, resizing to {}x{}",
                        name,
                        image.width,
                        image.height,
                        width,
                        height
                    );
                    overlay(&mut canvas, &image.resized(width, height)?, background);
                }
            }

            if let Some((w, h)) = resize {
                canvas = canvas.resized(w, h)?;
            }
            scene.insert_image(canvas);
            tracing::info!("Combined {} images into {}", names.len(), combined_name);

            for target in [&mut *ctx, &mut out] {
                target
                    .ensure_path(&[COMBINED_IMAGES, cat.as_str()])
                    .insert(pass.clone(), Value::String(combined_name.clone()));
            }
        }
        Ok(out)
    }
}

fn output_resolution(value: Option<&Value>) -> Option<(u32, u32)> {
    let res = value?.as_array()?;
    let w = u32::try_from(res.first()?.as_u64()?).ok()?;
    let h = u32::try_from(res.get(1)?.as_u64()?).ok()?;
    Some((w, h))
}

/// Copy every pixel of `layer` whose RGB differs from the background.
fn overlay(canvas: &mut ImageBuffer, layer: &ImageBuffer, background: [f32; 4]) {
    for (dst, src) in canvas.pixels_rgba_mut().zip(layer.pixels_rgba()) {
        let diff: f32 = src[..3]
            .iter()
            .zip(&background[..3])
            .map(|(a, b)| (a - b).abs())
            .sum();
        if diff > OVERLAY_THRESHOLD {
            dst.copy_from_slice(src);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::nodes::settings::BAKE_SETTINGS;
    use crate::registry::test_support::Harness;
    use serde_json::json;

    fn half(name: &str, left: bool, color: [f32; 4], background: [f32; 4]) -> ImageBuffer {
        let mut image = ImageBuffer::filled(name, 4, 4, background);
        for (i, px) in image.pixels_rgba_mut().enumerate() {
            if (i % 4 < 2) == left {
                px.copy_from_slice(&color);
            }
        }
        image
    }

    fn setup(harness: &Harness, pass: &str, background: [f32; 4]) -> Context {
        {
            let mut scene = harness.scene.lock().unwrap();
            scene.insert_image(half(
                &format!("Cube_Internal_{pass}"),
                true,
                [1.0, 0.0, 0.0, 1.0],
                background,
            ));
            scene.insert_image(half(
                &format!("Plane_Internal_{pass}"),
                false,
                [0.0, 1.0, 0.0, 1.0],
                background,
            ));
        }
        let mut ctx = Context::new();
        ctx.insert(BAKE_SETTINGS, json!({"resolution": [4, 4]}));
        ctx.insert(
            IMAGE_COMBINE,
            json!({"combine": true, "resize": false, "output_resolution": [32, 32]}),
        );
        ctx
    }

    fn results(pass: &str) -> Context {
        let mut previous = Context::new();
        for target in ["Cube", "Plane"] {
            previous
                .ensure_path(&[OUT_IMAGES, target, "Internal"])
                .insert(pass.to_string(), json!(format!("{target}_Internal_{pass}")));
        }
        previous
    }

    #[test]
    fn test_combines_group_of_two() {
        let harness = Harness::new(&[]);
        let mut ctx = setup(&harness, "AO", BACKGROUND);
        let mut env = harness.env("Combine");
        let out = CombineExecutor
            .execute(&mut env, &mut ctx, results("AO"))
            .unwrap();

        assert_eq!(
            out.get(COMBINED_IMAGES),
            Some(&json!({"Internal": {"AO": "Internal_AO_Combine"}}))
        );
        assert_eq!(ctx.get(COMBINED_IMAGES), out.get(COMBINED_IMAGES));

        let scene = harness.scene.lock().unwrap();
        let combined = scene.image("Internal_AO_Combine").unwrap();
        assert_eq!(combined.pixel(0, 0), Some([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(combined.pixel(3, 0), Some([0.0, 1.0, 0.0, 1.0]));
    }

    #[test]
    fn test_normal_pass_uses_flat_normal_background() {
        let harness = Harness::new(&[]);
        let mut ctx = setup(&harness, "Normal", NORMAL_BACKGROUND);
        let mut env = harness.env("Combine");
        CombineExecutor
            .execute(&mut env, &mut ctx, results("Normal"))
            .unwrap();

        let scene = harness.scene.lock().unwrap();
        let combined = scene.image("Internal_Normal_Combine").unwrap();
        assert_eq!(combined.pixel(0, 0), Some([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(combined.pixel(3, 3), Some([0.0, 1.0, 0.0, 1.0]));
    }

    #[test]
    fn test_resize_only_when_requested() {
        let harness = Harness::new(&[]);
        let mut ctx = setup(&harness, "AO", BACKGROUND);
        ctx.insert(
            IMAGE_COMBINE,
            json!({"combine": true, "resize": true, "output_resolution": [32, 16]}),
        );
        let mut env = harness.env("Combine");
        CombineExecutor
            .execute(&mut env, &mut ctx, results("AO"))
            .unwrap();
        let scene = harness.scene.lock().unwrap();
        assert_eq!(scene.image("Internal_AO_Combine").unwrap().size(), (32, 16));
    }

    #[test]
    fn test_single_image_groups_are_skipped() {
        let harness = Harness::new(&[]);
        let mut ctx = setup(&harness, "AO", BACKGROUND);
        let mut previous = Context::new();
        previous.insert(OUT_IMAGES, json!({"Cube": {"Internal": {"AO": "Cube_Internal_AO"}}}));
        let mut env = harness.env("Combine");
        let out = CombineExecutor.execute(&mut env, &mut ctx, previous).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_disabled_without_options() {
        let harness = Harness::new(&[]);
        let mut env = harness.env("Combine");
        let out = CombineExecutor
            .execute(&mut env, &mut Context::new(), results("AO"))
            .unwrap();
        assert!(out.is_empty());
    }
}
