//! Properties of the pixel pipeline that must hold for any input size:
//! tensor packing, mask application, edge softening and export.

mod common;

use common::{orchestrator, split_image, split_png, BrightnessEngine, ScriptedFetcher};
use local_bgremove::{
    soften_edges, ExportFormat, ImageIOService, MaskPostprocessor, MaskTensor, ModelKind,
    RasterImage, RemovalOptions, TensorPreprocessor,
};

fn gradient(width: u32, height: u32) -> RasterImage {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                ((x + y) % 256) as u8,
                255,
            ]);
        }
    }
    RasterImage::from_rgba(width, height, data).unwrap()
}

#[test]
fn test_tensor_shape_and_range_for_any_size() {
    for (width, height) in [(1, 1), (640, 100), (320, 320), (17, 333)] {
        let tensor = TensorPreprocessor::to_tensor(&gradient(width, height), 320).unwrap();
        assert_eq!(tensor.data.shape(), &[1, 3, 320, 320], "{width}x{height}");
        assert_eq!(tensor.len(), 3 * 320 * 320);
        assert!(tensor.data.iter().all(|v| (0.0..=1.0).contains(v)));
    }
}

#[test]
fn test_solid_colour_stays_solid_after_stretch() {
    let image = RasterImage::filled(123, 45, [255, 0, 51, 255]).unwrap();
    let tensor = TensorPreprocessor::to_tensor(&image, 320).unwrap();

    let plane = 320 * 320;
    let flat = tensor.as_flat();
    assert!(flat[..plane].iter().all(|v| (*v - 1.0).abs() < 1e-6));
    assert!(flat[plane..2 * plane].iter().all(|v| v.abs() < 1e-6));
    assert!(flat[2 * plane..].iter().all(|v| (*v - 0.2).abs() < 1e-6));
}

#[test]
fn test_input_alpha_does_not_affect_tensor() {
    let opaque = gradient(30, 20);
    let mut transparent = opaque.clone();
    transparent.set_alpha_channel(&vec![0; 600]).unwrap();

    let a = TensorPreprocessor::to_tensor(&opaque, 320).unwrap();
    let b = TensorPreprocessor::to_tensor(&transparent, 320).unwrap();
    assert_eq!(a.data, b.data);
}

#[test]
fn test_mask_application_preserves_rgb() {
    let original = gradient(50, 30);
    let mask = MaskTensor::square(320, vec![0.5; 320 * 320]).unwrap();

    let output = MaskPostprocessor::apply_mask(&mask, 320, 50, 30, &original).unwrap();

    assert_eq!(output.dimensions(), (50, 30));
    for (out, orig) in output
        .as_bytes()
        .chunks_exact(4)
        .zip(original.as_bytes().chunks_exact(4))
    {
        assert_eq!(&out[..3], &orig[..3]);
        assert_eq!(out[3], 128);
    }
}

#[test]
fn test_mask_of_wrong_side_is_rejected() {
    let original = gradient(10, 10);
    let mask = MaskTensor::square(160, vec![1.0; 160 * 160]).unwrap();
    assert!(MaskPostprocessor::apply_mask(&mask, 320, 10, 10, &original).is_err());
}

#[test]
fn test_softening_only_touches_alpha() {
    let mut image = split_image(32, 16);
    let alpha: Vec<u8> = (0..16)
        .flat_map(|_| (0..32).map(|x| if x < 16 { 255 } else { 0 }))
        .collect();
    image.set_alpha_channel(&alpha).unwrap();

    let softened = soften_edges(&image, 2.0);
    assert_eq!(softened.dimensions(), image.dimensions());
    for (out, orig) in softened
        .as_bytes()
        .chunks_exact(4)
        .zip(image.as_bytes().chunks_exact(4))
    {
        assert_eq!(&out[..3], &orig[..3]);
    }

    // The hard edge becomes a ramp, far pixels keep their value
    let row: Vec<u8> = softened.alpha_channel()[..32].to_vec();
    assert_eq!(row[0], 255);
    assert_eq!(row[31], 0);
    assert!(row[15] < 255 && row[16] > 0);
    assert!(row.windows(2).all(|w| w[0] >= w[1]));

    assert_eq!(soften_edges(&image, 2.0), softened);
    assert_eq!(soften_edges(&image, 0.0), image);
}

#[tokio::test]
async fn test_png_export_round_trips_alpha() {
    let orchestrator = orchestrator(BrightnessEngine::new(), ScriptedFetcher::new());
    let result = orchestrator
        .process(&split_png(64, 32), &RemovalOptions::new(ModelKind::General))
        .await
        .unwrap();

    assert_eq!(result.format, ExportFormat::Png);
    assert!(result.processed_encoded.starts_with(&[0x89, b'P', b'N', b'G']));

    let decoded = ImageIOService::decode(&result.processed_encoded).unwrap();
    assert_eq!(decoded, result.processed);
    assert_eq!(decoded.pixel(0, 16), Some([255, 255, 255, 255]));
    assert_eq!(decoded.pixel(63, 16), Some([0, 0, 0, 0]));

    let original = ImageIOService::decode(&result.original_encoded).unwrap();
    assert!(original.is_opaque());
}

#[tokio::test]
async fn test_portrait_output_matches_input_dimensions() {
    let orchestrator = orchestrator(BrightnessEngine::new(), ScriptedFetcher::new());
    let result = orchestrator
        .process(&split_png(37, 23), &RemovalOptions::new(ModelKind::Portrait))
        .await
        .unwrap();

    assert_eq!(result.processed.dimensions(), (37, 23));
    let alpha = result.processed.alpha_channel();
    assert_eq!(alpha[0], 255);
    assert_eq!(alpha[36], 0);
    assert!(result.foreground_ratio() > 0.4 && result.foreground_ratio() < 0.6);
}

#[cfg(feature = "webp-support")]
#[tokio::test]
async fn test_webp_export_has_riff_header() {
    let orchestrator = orchestrator(BrightnessEngine::new(), ScriptedFetcher::new());
    let options = RemovalOptions::new(ModelKind::General)
        .with_format(ExportFormat::WebP)
        .with_quality(0.8);

    let result = orchestrator.process(&split_png(40, 40), &options).await.unwrap();

    assert_eq!(result.format, ExportFormat::WebP);
    assert_eq!(&result.processed_encoded[..4], b"RIFF");
    assert_eq!(&result.processed_encoded[8..12], b"WEBP");
}
