use burn_core::tensor::backend::Backend;
use cgan_fid::config::{CganConfig, DiscriminatorConfig, GeneratorConfig, ImageShape};
use cgan_fid::data::synthetic_digits;
use cgan_fid::features::{ExtractorConfig, PixelMeanExtractor, RandomConvExtractor};
use cgan_fid::report::CollectingSink;
use cgan_fid::trainer::{build_trainer, train_cgan, CganBackend};

type Inner = <CganBackend as burn_core::tensor::backend::AutodiffBackend>::InnerBackend;

fn small_config(epochs: usize) -> CganConfig {
    CganConfig {
        epochs,
        batch_size: 8,
        latent_dim: 8,
        num_classes: 3,
        image: ImageShape::new(1, 12, 12),
        generator: GeneratorConfig {
            branch_width: 16,
            hidden_widths: [32, 64],
        },
        discriminator: DiscriminatorConfig {
            branch_width: 32,
            hidden_widths: [16, 8],
            leaky_slope: 0.2,
        },
        report_every: 3,
        seed: 7,
        ..Default::default()
    }
}

#[test]
fn training_with_a_conv_extractor_reports_finite_metrics() {
    let device = <CganBackend as Backend>::Device::default();
    let cfg = small_config(2);
    // 3 classes x 10 = 30 samples, batch 8 => 3 batches per epoch.
    let ds = synthetic_digits(3, 10, cfg.image, 0.15, 42).unwrap();

    let extractor = RandomConvExtractor::<Inner>::new(
        &device,
        &ExtractorConfig {
            output_blocks: vec![2, 3],
            resize_to: Some([16, 16]),
            normalize_input: false,
            block_widths: [4, 4, 6, 6],
        },
    )
    .unwrap();

    let mut sink = CollectingSink::default();
    let state = train_cgan::<CganBackend, _, _>(&device, cfg, &ds, &extractor, &mut sink).unwrap();

    assert_eq!(state.epoch, 2);
    assert_eq!(state.batches_done, 6);
    assert!(state
        .d_losses
        .iter()
        .chain(&state.g_losses)
        .all(|l| l.is_finite() && *l >= 0.0));
    assert!(state.fids.iter().all(|f| f.is_finite()), "fids={:?}", state.fids);

    // Batches 0 of each epoch (report_every = 3, three batches per epoch).
    assert_eq!(sink.batches.len(), 2);
    assert_eq!(sink.epochs.len(), 2);
    assert_eq!(sink.epochs[1].fid, state.fids[1]);
}

#[test]
fn a_trained_generator_samples_every_class_in_range() {
    let device = <CganBackend as Backend>::Device::default();
    let cfg = small_config(1);
    let ds = synthetic_digits(3, 8, cfg.image, 0.1, 1).unwrap();

    let mut trainer = build_trainer::<CganBackend>(&device, cfg).unwrap();
    trainer
        .fit(&ds, &PixelMeanExtractor, CollectingSink::default())
        .unwrap();

    let imgs = trainer.generate(&[0, 1, 2, 0], 99).unwrap();
    assert_eq!(imgs.dims(), [4, 1, 12, 12]);
    let values = imgs.into_data().convert::<f32>().to_vec::<f32>().unwrap();
    assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
}

#[test]
fn config_round_trips_through_json() {
    let cfg = small_config(4);
    let dir = std::env::temp_dir().join(format!("cgan-fid-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.json");
    std::fs::write(&path, serde_json::to_string_pretty(&cfg).unwrap()).unwrap();

    let loaded = CganConfig::from_json_file(&path).unwrap();
    assert_eq!(loaded.epochs, 4);
    assert_eq!(loaded.image, cfg.image);
    assert_eq!(loaded.generator, cfg.generator);
    assert_eq!(loaded.discriminator, cfg.discriminator);
    std::fs::remove_dir_all(&dir).unwrap();
}
