use std::sync::Arc;

use burn::backend::Autodiff;
use burn::optim::AdamWConfig;
use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use image::{Rgb, RgbImage};
use srn_core::StereoPair;
use srn_io::{discover_samples, load_checkpoint, LoadMode};
use srn_model::StereoRestorerConfig;
use srn_train::{
    EarlyStoppingCallback, HistoryCallback, LearningRateSchedule, PixelLossConfig, ProgressTracker,
    StereoBatch, StereoTrainer, TrainingConfig,
};
use tempfile::tempdir;

type Backend = Autodiff<NdArray<f32>>;

fn model_config() -> StereoRestorerConfig {
    StereoRestorerConfig::new()
        .with_width(4)
        .with_encoder_blocks(vec![1])
        .with_decoder_blocks(vec![1])
}

fn batch(device: &<Backend as burn::tensor::backend::Backend>::Device) -> StereoBatch<Backend> {
    let input = Tensor::<Backend, 4>::full([2, 3, 6, 6], 0.6, device);
    let target = Tensor::<Backend, 4>::full([2, 3, 6, 6], 0.4, device);
    StereoBatch::new(
        StereoPair::new(input.clone(), input),
        StereoPair::new(target.clone(), target),
    )
}

#[test]
fn test_fit_writes_checkpoints() {
    let dir = tempdir().unwrap();
    let device = Default::default();
    let config = TrainingConfig::new()
        .with_loss(PixelLossConfig::Charbonnier { loss_weight: 1.0, eps: 1e-3 })
        .with_schedule(LearningRateSchedule::cosine_annealing(1e-2, 1e-4, 5))
        .with_num_iterations(5)
        .with_checkpoint_every(2)
        .with_checkpoint_dir(Some(dir.path().to_path_buf()))
        .with_grad_clip_norm(Some(0.01));
    let optimizer = AdamWConfig::new().with_grad_clipping(config.grad_clipping()).init();
    let mut trainer = StereoTrainer::new(model_config().init::<Backend>(&device).unwrap(), optimizer, config).unwrap();

    let history = Arc::new(HistoryCallback::new());
    let tracker = ProgressTracker::new().with_callback(history.clone());
    let stats = trainer
        .fit(std::iter::repeat_with(|| batch(&device)).take(100), &tracker)
        .unwrap();

    assert_eq!(stats.len(), 5);
    assert_eq!(history.losses().len(), 5);
    assert!(stats[4].learning_rate < stats[0].learning_rate);

    for iteration in [2, 4, 5] {
        let path = dir.path().join(format!("iter_{:06}.json.gz", iteration));
        assert!(path.exists(), "{} missing", path.display());
    }
    assert!(!dir.path().join("iter_000003.json.gz").exists());

    let (_, config, report) =
        load_checkpoint::<NdArray<f32>, _>(dir.path().join("iter_000005.json.gz"), &Default::default(), LoadMode::Strict)
            .unwrap();
    assert_eq!(config, model_config());
    assert!(report.is_complete());
}

#[test]
fn test_fit_stops_early() {
    let device = Default::default();
    let config = TrainingConfig::new().with_num_iterations(50);
    let optimizer = AdamWConfig::new().init();
    let mut trainer = StereoTrainer::new(model_config().init::<Backend>(&device).unwrap(), optimizer, config).unwrap();

    let tracker = ProgressTracker::new().with_callback(Arc::new(EarlyStoppingCallback::new(0.0, 1).with_min_loss(10.0)));
    let stats = trainer
        .fit(std::iter::repeat_with(|| batch(&device)), &tracker)
        .unwrap();
    assert_eq!(stats.len(), 1);
}

#[test]
fn test_batch_from_dataset() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    for sub in ["input/left", "input/right", "gt/left", "gt/right"] {
        std::fs::create_dir_all(root.join(sub)).unwrap();
    }
    let degraded = RgbImage::from_pixel(5, 4, Rgb([200, 200, 200]));
    let clean = RgbImage::from_pixel(5, 4, Rgb([100, 100, 100]));
    for id in ["a", "b"] {
        degraded.save(root.join(format!("input/left/{id}_left.png"))).unwrap();
        degraded.save(root.join(format!("input/right/{id}_right.png"))).unwrap();
        clean.save(root.join(format!("gt/left/{id}_left.png"))).unwrap();
        clean.save(root.join(format!("gt/right/{id}_right.png"))).unwrap();
    }

    let samples = discover_samples(root).unwrap();
    let device = Default::default();
    let batch = StereoBatch::<Backend>::load(&samples, &device).unwrap();
    assert_eq!(batch.batch_size(), 2);
    assert_eq!(batch.target.right.dims(), [2, 3, 4, 5]);

    let mut trainer = StereoTrainer::new(
        model_config().init::<Backend>(&device).unwrap(),
        AdamWConfig::new().init(),
        TrainingConfig::new().with_loss(PixelLossConfig::Psnr { loss_weight: 1.0 }),
    )
    .unwrap();
    let stats = trainer.step(batch).unwrap();
    assert!(stats.loss.is_finite());
}
