use burn::tensor::{Distribution, Tensor};
use burn_ndarray::NdArray;
use srn_core::filter::PaddingMode;
use srn_model::network::{presets, StereoRestorerConfig};

type Backend = NdArray<f32>;

#[test]
fn test_fresh_model_passes_gray_pair_through() {
    let device = Default::default();
    let model = StereoRestorerConfig::new().init::<Backend>(&device).unwrap();

    let gray = Tensor::<Backend, 4>::full([1, 3, 128, 128], 0.5, &device);
    let out = model.restore(gray.clone(), gray.clone()).unwrap();

    assert_eq!(out.left.dims(), [1, 3, 128, 128]);
    assert_eq!(out.right.dims(), [1, 3, 128, 128]);
    let err_left = (out.left - gray.clone()).abs().max().into_scalar();
    let err_right = (out.right - gray).abs().max().into_scalar();
    assert!(err_left < 1e-6, "left drifted by {}", err_left);
    assert!(err_right < 1e-6, "right drifted by {}", err_right);
}

#[test]
fn test_lightweight_preset_on_odd_sizes() {
    let device = Default::default();
    let config = presets::lightweight()
        .with_width(8)
        .with_residual_scale_init(0.05)
        .with_zero_init_ending(false);
    let model = config.init::<Backend>(&device).unwrap();

    let left = Tensor::<Backend, 4>::random([1, 3, 21, 30], Distribution::Default, &device);
    let right = Tensor::<Backend, 4>::random([1, 3, 21, 30], Distribution::Default, &device);
    let (out_left, out_right) = model.forward(left, right).unwrap();

    assert_eq!(out_left.dims(), [1, 3, 21, 30]);
    assert_eq!(out_right.dims(), [1, 3, 21, 30]);
}

#[test]
fn test_partial_fusion_and_zero_padding() {
    let device = Default::default();
    let config = StereoRestorerConfig::new()
        .with_width(4)
        .with_encoder_blocks(vec![1, 0, 1])
        .with_decoder_blocks(vec![0, 1, 1])
        .with_fusion_stages(Some(vec![0, 2]))
        .with_padding(PaddingMode::Zero)
        .with_crop_to_input(false);
    let model = config.init::<Backend>(&device).unwrap();
    assert_eq!(model.fusion_stages(), vec![0, 2]);

    let x = Tensor::<Backend, 4>::random([2, 3, 10, 3], Distribution::Default, &device);
    let out = model.restore(x.clone(), x).unwrap();
    assert_eq!(out.left.dims(), [2, 3, 16, 8]);
}
