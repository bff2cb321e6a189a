//! The augmentation orchestrator: a fixed sequence of independently gated stages.

use crate::config::{AugmentConfig, Chance};
use crate::geometry::{flip_box, letterbox_boxes, rotate_box};
use crate::image_ops::{
    color_jitter, fit_letterbox, flip_image, mixup_composite, mosaic_compose, pixelate,
    resize_letterbox, rotate_image,
};
use crate::label::LabelLine;
use crate::pool::{FsImageSource, ImageSource, SamplePool};
use crate::types::{AugmentError, AugmentResult, AugmentedSample, Canvas, FlipCode, Sample};
use rand::{Rng, SeedableRng};

/// Applies the augmentation policy to one sample at a time.
///
/// Stage order is rotate, flip, pixelate, mixup, mosaic, letterbox resize, color jitter;
/// each stage fires on its own [`Chance`]. The result always has the canvas size: when the
/// letterbox stage does not fire and the image is off-size, an aspect-preserving fit is
/// applied instead. Partner samples for mixup and mosaic come from the optional pool.
///
/// Each stage keeps its own boxes inside its own frame; there is no cleanup pass at the end.
/// Boxes that no stage touches are returned as given.
///
/// Shared read-only across threads; every call owns its sample and RNG.
#[derive(Debug, Clone)]
pub struct Augmenter<S = FsImageSource> {
    config: AugmentConfig,
    pool: Option<SamplePool<S>>,
}

impl Augmenter<FsImageSource> {
    /// Validates `config` and, when it names a pool label file, loads that pool.
    pub fn from_config(config: AugmentConfig) -> AugmentResult<Self> {
        config.validate()?;
        let pool = match &config.pool_labels {
            Some(path) => {
                let lines = crate::label::read_label_lines(path)?;
                let source = match &config.image_root {
                    Some(root) => FsImageSource::with_root(root),
                    None => FsImageSource::new(),
                };
                tracing::info!(path = %path.display(), lines = lines.len(), "loaded sample pool");
                Some(SamplePool::new(lines, source))
            }
            None => None,
        };
        Ok(Self { config, pool })
    }
}

impl<S: ImageSource> Augmenter<S> {
    pub fn config(&self) -> &AugmentConfig {
        &self.config
    }

    pub fn pool(&self) -> Option<&SamplePool<S>> {
        self.pool.as_ref()
    }

    pub fn describe(&self) -> String {
        let pool = self
            .pool
            .as_ref()
            .map(|p| p.len().to_string())
            .unwrap_or_else(|| "none".to_string());
        format!("{} pool={}", self.config.describe(), pool)
    }

    /// Runs every stage on `sample`. Any failure (a partner that cannot be drawn or decoded)
    /// aborts the whole call; nothing partial is returned.
    pub fn augment(
        &self,
        sample: Sample,
        rng: &mut dyn rand::RngCore,
    ) -> AugmentResult<AugmentedSample> {
        let cfg = &self.config;
        let Sample {
            mut image,
            mut boxes,
        } = sample;

        if cfg.p_rotate.fires(rng) {
            let angle = f64::from(90 * rng.random_range(0..4u32));
            tracing::debug!(stage = "rotate", angle, "augment stage");
            boxes = rotate_box(image.height(), image.width(), &boxes, angle);
            image = rotate_image(&image, angle);
        }

        if cfg.p_flip.fires(rng) {
            let flip = FlipCode::ALL[rng.random_range(0..FlipCode::ALL.len())];
            tracing::debug!(stage = "flip", code = flip.code(), "augment stage");
            boxes = flip_box(image.height(), image.width(), &boxes, flip);
            flip_image(&mut image, flip);
        }

        if cfg.p_pixelate.fires(rng) {
            tracing::debug!(
                stage = "pixelate",
                regions = boxes.len().max(1),
                "augment stage"
            );
            pixelate(
                &mut image,
                &boxes,
                cfg.pixelate_count_max,
                cfg.pixelate_mask_ratio,
                cfg.pixelate_kernel_ratio,
                rng,
            );
        }

        if cfg.p_mixup.fires(rng) {
            let partner = match self.draw_partners::<1>(rng)? {
                Some([partner]) => partner,
                None => Sample::new(image.clone(), boxes.clone()),
            };
            tracing::debug!(
                stage = "mixup",
                own = boxes.len(),
                partner = partner.boxes.len(),
                "augment stage"
            );
            let mixed = mixup_composite(&image, &partner.image, &boxes, &partner.boxes);
            image = mixed.image;
            boxes = mixed.boxes;
        }

        if cfg.p_mosaic.fires(rng) {
            match self.draw_partners::<3>(rng)? {
                Some([a, b, c]) => {
                    tracing::debug!(stage = "mosaic", canvas = %cfg.canvas, "augment stage");
                    let tiled = mosaic_compose(
                        [Sample::new(image, boxes), a, b, c],
                        cfg.canvas,
                        rng,
                    );
                    image = tiled.image;
                    boxes = tiled.boxes;
                }
                None => tracing::warn!("mosaic skipped: no sample pool configured"),
            }
        }

        let (orig_h, orig_w) = (image.height(), image.width());
        if cfg.p_resize.fires(rng) {
            let (placed, layout) = resize_letterbox(&image, cfg.canvas, cfg.resize_scale_range, rng);
            tracing::debug!(
                stage = "letterbox",
                case = ?layout.case,
                new_w = layout.new_w,
                new_h = layout.new_h,
                "augment stage"
            );
            boxes = letterbox_boxes(&boxes, orig_h, orig_w, &layout);
            image = placed;
        } else if !cfg.canvas.matches(&image) {
            let (placed, layout) = fit_letterbox(&image, cfg.canvas);
            tracing::debug!(stage = "fit", from = %format!("{orig_h}x{orig_w}"), "augment stage");
            boxes = letterbox_boxes(&boxes, orig_h, orig_w, &layout);
            image = placed;
        }

        if cfg.p_color.fires(rng) {
            tracing::debug!(stage = "color", "augment stage");
            color_jitter(
                &mut image,
                cfg.color_hue_range,
                cfg.color_sat_range,
                cfg.color_val_range,
                rng,
            );
        }

        Ok(AugmentedSample::from_sample(Sample::new(image, boxes)))
    }

    /// Like [`Self::augment`], with a per-sample RNG: `seed ^ index` when the config carries
    /// a seed, otherwise the thread-local generator.
    pub fn augment_indexed(&self, sample: Sample, index: u64) -> AugmentResult<AugmentedSample> {
        self.with_indexed_rng(index, |rng| self.augment(sample, rng))
    }

    /// [`Self::augment_line`] with the per-sample RNG of [`Self::augment_indexed`].
    pub fn augment_line_indexed(
        &self,
        line: &LabelLine,
        index: u64,
    ) -> AugmentResult<AugmentedSample> {
        self.with_indexed_rng(index, |rng| self.augment_line(line, rng))
    }

    fn with_indexed_rng<T>(&self, index: u64, f: impl FnOnce(&mut dyn rand::RngCore) -> T) -> T {
        match self.config.seed {
            Some(seed) => f(&mut rand::rngs::StdRng::seed_from_u64(seed ^ index)),
            None => f(&mut rand::rng()),
        }
    }

    /// Decodes `line` (through the pool's image source when there is one) and augments it.
    pub fn augment_line(
        &self,
        line: &LabelLine,
        rng: &mut dyn rand::RngCore,
    ) -> AugmentResult<AugmentedSample> {
        let sample = match &self.pool {
            Some(pool) => pool.decode(line)?,
            None => {
                let source = match &self.config.image_root {
                    Some(root) => FsImageSource::with_root(root),
                    None => FsImageSource::new(),
                };
                Sample::new(source.load(&line.path)?, line.boxes.clone())
            }
        };
        self.augment(sample, rng)
    }

    /// Draws the primary sample from the pool, then augments it.
    pub fn augment_from_pool(&self, rng: &mut dyn rand::RngCore) -> AugmentResult<AugmentedSample> {
        match self.draw_partners::<1>(rng)? {
            Some([sample]) => self.augment(sample, rng),
            None => Err(AugmentError::InsufficientPoolSize {
                requested: 1,
                available: 0,
            }),
        }
    }

    /// `None` when no pool is configured.
    fn draw_partners<const N: usize>(
        &self,
        rng: &mut dyn rand::RngCore,
    ) -> AugmentResult<Option<[Sample; N]>> {
        let Some(pool) = &self.pool else {
            return Ok(None);
        };
        let drawn = pool.draw_samples(N, rng)?;
        let available = drawn.len();
        drawn
            .try_into()
            .map(Some)
            .map_err(|_| AugmentError::InsufficientPoolSize {
                requested: N,
                available,
            })
    }
}

#[derive(Debug, Clone)]
pub struct AugmenterBuilder<S = FsImageSource> {
    config: AugmentConfig,
    pool: Option<SamplePool<S>>,
}

impl Default for AugmenterBuilder<FsImageSource> {
    fn default() -> Self {
        Self::new()
    }
}

impl AugmenterBuilder<FsImageSource> {
    pub fn new() -> Self {
        Self {
            config: AugmentConfig::default(),
            pool: None,
        }
    }
}

impl<S: ImageSource> AugmenterBuilder<S> {
    pub fn config(mut self, config: AugmentConfig) -> Self {
        self.config = config;
        self
    }
    pub fn canvas(mut self, canvas: Canvas) -> Self {
        self.config.canvas = canvas;
        self
    }
    pub fn rotate(mut self, chance: Chance) -> Self {
        self.config.p_rotate = chance;
        self
    }
    pub fn flip(mut self, chance: Chance) -> Self {
        self.config.p_flip = chance;
        self
    }
    pub fn pixelate(mut self, chance: Chance, count_max: u32, mask_ratio: f64, kernel_ratio: f64) -> Self {
        self.config.p_pixelate = chance;
        self.config.pixelate_count_max = count_max;
        self.config.pixelate_mask_ratio = mask_ratio;
        self.config.pixelate_kernel_ratio = kernel_ratio;
        self
    }
    pub fn mixup(mut self, chance: Chance) -> Self {
        self.config.p_mixup = chance;
        self
    }
    pub fn mosaic(mut self, chance: Chance) -> Self {
        self.config.p_mosaic = chance;
        self
    }
    pub fn resize(mut self, chance: Chance, scale_min: f64, scale_max: f64) -> Self {
        self.config.p_resize = chance;
        self.config.resize_scale_range = (scale_min, scale_max);
        self
    }
    pub fn color(mut self, chance: Chance, hue: f64, sat: f64, val: f64) -> Self {
        self.config.p_color = chance;
        self.config.color_hue_range = hue;
        self.config.color_sat_range = sat;
        self.config.color_val_range = val;
        self
    }
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.config.seed = seed;
        self
    }
    /// Disables every stage; handy as a base for enabling a single one.
    pub fn all_stages_off(mut self) -> Self {
        let cfg = &mut self.config;
        for chance in [
            &mut cfg.p_rotate,
            &mut cfg.p_flip,
            &mut cfg.p_pixelate,
            &mut cfg.p_mixup,
            &mut cfg.p_mosaic,
            &mut cfg.p_resize,
            &mut cfg.p_color,
        ] {
            *chance = Chance::never();
        }
        self
    }
    pub fn pool<T: ImageSource>(self, pool: SamplePool<T>) -> AugmenterBuilder<T> {
        AugmenterBuilder {
            config: self.config,
            pool: Some(pool),
        }
    }
    pub fn build(self) -> AugmentResult<Augmenter<S>> {
        self.config.validate()?;
        Ok(Augmenter {
            config: self.config,
            pool: self.pool,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;
    use image::{Rgb, RgbImage};
    use rand::rngs::StdRng;

    fn sample(width: u32, height: u32, boxes: Vec<BoundingBox>) -> Sample {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8])
        });
        Sample::new(img, boxes)
    }

    #[test]
    fn defaults_without_pool_always_hit_the_canvas() {
        let augmenter = AugmenterBuilder::new()
            .canvas(Canvas::new(96, 128))
            .build()
            .unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        for i in 0..20u32 {
            let boxes = vec![
                BoundingBox::new(10, 10, 60, 40, i),
                BoundingBox::new(0, 0, 200, 150, 1),
            ];
            let out = augmenter.augment(sample(200, 150, boxes), &mut rng).unwrap();
            assert_eq!(out.dimensions(), (128, 96));
            for b in &out.boxes {
                assert!(0 <= b.x1 && b.x1 < b.x2 && b.x2 <= 128, "{b:?}");
                assert!(0 <= b.y1 && b.y1 < b.y2 && b.y2 <= 96, "{b:?}");
            }
            assert!(out.image.pixels().all(|p| p.0.iter().all(|c| (0.0..=1.0).contains(c))));
        }
    }

    #[test]
    fn disabled_stages_only_fit_the_canvas() {
        let augmenter = AugmenterBuilder::new()
            .all_stages_off()
            .canvas(Canvas::new(100, 100))
            .build()
            .unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let input = sample(100, 100, vec![BoundingBox::new(5, 5, 50, 50, 2)]);
        let out = augmenter.augment(input.clone(), &mut rng).unwrap();
        assert_eq!(out.boxes, input.boxes);
        assert_eq!(out.to_rgb8(), input.image);

        let out = augmenter
            .augment(sample(200, 100, vec![BoundingBox::new(0, 0, 100, 100, 1)]), &mut rng)
            .unwrap();
        assert_eq!(out.dimensions(), (100, 100));
        assert_eq!(out.boxes, vec![BoundingBox::new(0, 25, 50, 75, 1)]);
    }

    #[test]
    fn mixup_without_pool_self_mixes() {
        let augmenter = AugmenterBuilder::new()
            .all_stages_off()
            .mixup(Chance::always())
            .canvas(Canvas::new(50, 50))
            .build()
            .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let input = sample(50, 50, vec![BoundingBox::new(1, 1, 10, 10, 0)]);
        let out = augmenter.augment(input.clone(), &mut rng).unwrap();
        assert_eq!(out.boxes.len(), 2);
        assert_eq!(out.to_rgb8(), input.image);
    }

    #[test]
    fn mosaic_without_pool_is_skipped() {
        let augmenter = AugmenterBuilder::new()
            .all_stages_off()
            .mosaic(Chance::always())
            .canvas(Canvas::new(40, 40))
            .build()
            .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let input = sample(40, 40, vec![BoundingBox::new(1, 1, 10, 10, 0)]);
        let out = augmenter.augment(input.clone(), &mut rng).unwrap();
        assert_eq!(out.boxes, input.boxes);
        assert_eq!(out.to_rgb8(), input.image);
    }

    #[test]
    fn augment_from_pool_requires_a_pool() {
        let augmenter = AugmenterBuilder::new().build().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            augmenter.augment_from_pool(&mut rng),
            Err(AugmentError::InsufficientPoolSize { requested: 1, available: 0 })
        ));
    }

    #[test]
    fn builder_rejects_invalid_policy() {
        let err = AugmenterBuilder::new()
            .rotate(Chance::new(2, 0))
            .build()
            .unwrap_err();
        assert!(matches!(err, AugmentError::InvalidConfig(_)));
    }

    #[test]
    fn extreme_label_coordinates_do_not_panic() {
        let line: LabelLine = "a.png 0,0,2147483647,2147483647,1 -2147483648,0,5,5"
            .parse()
            .unwrap();
        let canvas = Canvas::new(40, 40);
        let augmenter = AugmenterBuilder::new()
            .canvas(canvas)
            .rotate(Chance::new(1, 2))
            .flip(Chance::new(1, 2))
            .mixup(Chance::new(1, 2))
            .build()
            .unwrap();
        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);
            let out = augmenter
                .augment(sample(50, 50, line.boxes.clone()), &mut rng)
                .unwrap();
            assert_eq!(out.dimensions(), (40, 40));
            for b in &out.boxes {
                assert!(0 <= b.x1 && b.x1 < b.x2 && b.x2 <= 40, "seed {seed}: {b:?}");
                assert!(0 <= b.y1 && b.y1 < b.y2 && b.y2 <= 40, "seed {seed}: {b:?}");
            }
        }
    }

    #[test]
    fn seeded_config_makes_indexed_calls_reproducible() {
        let augmenter = AugmenterBuilder::new()
            .canvas(Canvas::new(64, 64))
            .seed(Some(1234))
            .build()
            .unwrap();
        let input = sample(80, 60, vec![BoundingBox::new(10, 10, 40, 40, 3)]);
        let a = augmenter.augment_indexed(input.clone(), 7).unwrap();
        let b = augmenter.augment_indexed(input, 7).unwrap();
        assert_eq!(a.boxes, b.boxes);
        assert_eq!(a.image, b.image);
    }
}
