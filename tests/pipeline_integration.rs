// End-to-end pipeline tests: WAV on disk through features, projection,
// clustering, manual labels and classification on one AnalysisService.

use std::f32::consts::PI;
use std::path::{Path, PathBuf};

use sound_ai::api::{
    AnalysisService, ClassifyRequest, ClusterRequest, FeaturesRequest, LabelsRequest,
    ReduceRequest, SpecRequest, LABEL_REQUIRED, NO_VALID_FILES,
};
use sound_ai::config::AppConfig;
use sound_ai::ErrorKind;

const SAMPLE_RATE: u32 = 22_050;

/// Ten seconds of mono audio: a low tone for five seconds, then a high one
fn write_two_tone_wav(dir: &Path) -> PathBuf {
    let path = dir.join("two_tone.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
    let total = SAMPLE_RATE as usize * 10;
    for n in 0..total {
        let t = n as f32 / SAMPLE_RATE as f32;
        let freq = if t < 5.0 { 440.0 } else { 3_000.0 };
        let sample = 0.5 * (2.0 * PI * freq * t).sin();
        writer
            .write_sample((sample * i16::MAX as f32) as i16)
            .expect("write sample");
    }
    writer.finalize().expect("finalize wav");
    path
}

fn features_request(path: &Path) -> FeaturesRequest {
    FeaturesRequest {
        file_paths: vec![path.display().to_string()],
        mode: "MFCC".to_string(),
        segment_length: 1.0,
    }
}

fn rows_json<T: serde::Serialize>(value: &T) -> Vec<serde_json::Value> {
    let json = serde_json::to_value(value).expect("serialize response");
    json["rows"].as_array().expect("rows array").clone()
}

#[test]
fn full_pipeline_over_a_wav_file() {
    let dir = tempfile::tempdir().unwrap();
    let wav = write_two_tone_wav(dir.path());
    let service = AnalysisService::new(AppConfig::default());

    let requested = wav.display().to_string();
    let features = service.features(&features_request(&wav)).expect("features");
    let rows = rows_json(&features);
    assert_eq!(rows.len(), 10);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row["second"], i as f64);
        assert_eq!(row["file_name"], requested.as_str());
        assert!(row["feature_1"].is_number());
    }

    let reduced = service
        .reduce(&ReduceRequest { method: "PCA".to_string() })
        .expect("reduce");
    let rows = rows_json(&reduced);
    assert_eq!(rows.len(), 10);
    assert!(rows.iter().all(|row| row["x"].is_number() && row["y"].is_number()));
    assert_eq!(rows[9]["second"], 9.0);
    assert_eq!(rows[9]["file_name"], requested.as_str());

    let clustered = service
        .cluster(&ClusterRequest { algorithm: "KMeans".to_string(), n_clusters: 2 })
        .expect("cluster");
    assert!(clustered.n_labels == 1 || clustered.n_labels == 2);
    if clustered.n_labels == 1 {
        assert_eq!(clustered.silhouette, 0.0);
    } else {
        assert!(clustered.silhouette > -1.0 && clustered.silhouette <= 1.0);
    }
    assert_eq!(clustered.rows.labels().map(|l| l.len()), Some(10));

    service
        .set_labels(&LabelsRequest { labels: vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1] })
        .expect("labels");

    let classified = service
        .classify(&ClassifyRequest { model: "Random Forest".to_string(), split_pct: 70 })
        .expect("classify");
    let total: u64 = classified.cm.iter().flatten().sum();
    assert_eq!(total, 3);
    assert_eq!(classified.labels, vec![0, 1]);
    assert!((0.0..=1.0).contains(&classified.accuracy));
    assert!(classified.report.contains("accuracy"));

    let spectrogram = service
        .spectrogram(&SpecRequest {
            file_path: wav.display().to_string(),
            start_s: 4.5,
            dur_s: 1.0,
            fmin: 0.0,
            fmax: 8_000.0,
            cmap: "viridis".to_string(),
        })
        .expect("spectrogram");
    assert!(!spectrogram.png_base64.is_empty());
}

#[test]
fn classify_before_clustering_needs_labels() {
    let dir = tempfile::tempdir().unwrap();
    let wav = write_two_tone_wav(dir.path());
    let service = AnalysisService::new(AppConfig::default());

    service.features(&features_request(&wav)).expect("features");
    service
        .reduce(&ReduceRequest { method: "PCA".to_string() })
        .expect("reduce");

    let err = service
        .classify(&ClassifyRequest { model: "Decision Tree".to_string(), split_pct: 70 })
        .unwrap_err();
    assert_eq!(err.message, LABEL_REQUIRED);
    assert_eq!(err.kind, ErrorKind::InputValidation);
}

#[test]
fn empty_request_leaves_state_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let wav = write_two_tone_wav(dir.path());
    let service = AnalysisService::new(AppConfig::default());
    service.features(&features_request(&wav)).expect("features");

    let err = service
        .features(&FeaturesRequest {
            file_paths: Vec::new(),
            mode: "MFCC".to_string(),
            segment_length: 1.0,
        })
        .unwrap_err();
    assert_eq!(err.message, NO_VALID_FILES);

    let kept = service.state().features().unwrap().expect("features kept");
    assert_eq!(kept.n_rows(), 10);
}

#[test]
fn one_missing_file_fails_the_request() {
    let dir = tempfile::tempdir().unwrap();
    let wav = write_two_tone_wav(dir.path());
    let service = AnalysisService::new(AppConfig::default());
    service.features(&features_request(&wav)).expect("features");

    let typo = dir.path().join("two_tone_typo.wav").display().to_string();
    let err = service
        .features(&FeaturesRequest {
            file_paths: vec![wav.display().to_string(), typo.clone()],
            mode: "MFCC".to_string(),
            segment_length: 1.0,
        })
        .unwrap_err();
    assert!(err.message.starts_with("Feature extraction failed: "));
    assert!(err.message.contains(&typo));
    assert_eq!(err.kind, ErrorKind::InputValidation);

    let kept = service.state().features().unwrap().expect("features kept");
    assert_eq!(kept.n_rows(), 10);
}

#[test]
fn row_file_name_loads_its_spectrogram() {
    let dir = tempfile::tempdir().unwrap();
    let wav = write_two_tone_wav(dir.path());
    let service = AnalysisService::new(AppConfig::default());

    let features = service.features(&features_request(&wav)).expect("features");
    let rows = rows_json(&features);
    let file_path = rows[3]["file_name"].as_str().expect("file_name").to_string();
    let start_s = rows[3]["second"].as_f64().expect("second");

    let spectrogram = service
        .spectrogram(&SpecRequest {
            file_path,
            start_s,
            dur_s: 1.0,
            fmin: 0.0,
            fmax: 20_000.0,
            cmap: "inferno".to_string(),
        })
        .expect("spectrogram of a selected row");
    assert!(!spectrogram.png_base64.is_empty());
}

#[test]
fn csv_mode_reads_feature_tables() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("embeddings.csv");
    std::fs::write(&csv, "a,b\n0.0,1.0\n1.0,0.0\n2.0,2.0\n").unwrap();
    let service = AnalysisService::new(AppConfig::default());

    let response = service
        .features(&FeaturesRequest {
            file_paths: vec![csv.display().to_string()],
            mode: "CSV".to_string(),
            segment_length: 1.0,
        })
        .expect("csv features");
    let rows = rows_json(&response);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2]["file_name"], csv.display().to_string());
}
