//! Image-to-viewport scale transforms.
//!
//! Uses glam::Affine2 (scale + translate, no rotation). The transform maps
//! image pixel coordinates to viewport coordinates, Y-down:
//! view = scale * image + translation
//!
//! Pure: the same inputs always give the same transform.

use glam::{Affine2, Vec2};
use serde::{Deserialize, Serialize};

/// Policy for mapping image dimensions onto the viewport
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    /// Stretch each axis independently to fill the viewport
    FitXy,
    /// Largest aspect-preserving fit, centered
    #[default]
    FitCenter,
    /// 1:1 centered when it fits, otherwise `FitCenter`
    Center,
}

/// Compute the transform for an image of `image` size shown in `viewport`.
///
/// Zero-sized images or viewports give identity.
pub fn scale_transform(image: (u32, u32), viewport: (u32, u32), mode: ScaleMode) -> Affine2 {
    let img = Vec2::new(image.0 as f32, image.1 as f32);
    let view = Vec2::new(viewport.0 as f32, viewport.1 as f32);
    if img.cmple(Vec2::ZERO).any() || view.cmple(Vec2::ZERO).any() {
        return Affine2::IDENTITY;
    }

    match mode {
        ScaleMode::FitXy => Affine2::from_scale(view / img),
        ScaleMode::FitCenter => fit_center(img, view),
        ScaleMode::Center => {
            if img.cmple(view).all() {
                Affine2::from_translation((view - img) * 0.5)
            } else {
                fit_center(img, view)
            }
        }
    }
}

fn fit_center(img: Vec2, view: Vec2) -> Affine2 {
    let img_ratio = img.x / img.y;
    let view_ratio = view.x / view.y;

    // Wider than the view: width-bound; otherwise height-bound
    let shown = if img_ratio >= view_ratio {
        Vec2::new(view.x, view.x / img_ratio)
    } else {
        Vec2::new(view.y * img_ratio, view.y)
    };
    let scale = shown.x / img.x;
    Affine2::from_scale_angle_translation(Vec2::splat(scale), 0.0, (view - shown) * 0.5)
}
