use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use clap::Parser;
use key_attestation::{
    AttestationVerifier, CertificateChain, HardwareClassifier, SecurityLevel,
    VerificationResponse,
};
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use reqwest::StatusCode;
use serde_json::json;
use tokio::net::TcpListener;

use crate::{
    config::{ClassifierKind, RequiredLevel},
    constants::{DEFAULT_MAX_BODY_BYTES, INVALID_JSON_MESSAGE, TIMEOUT_MESSAGE},
    router, serve, AppState, ServerConfig, ServerError,
};

const CHALLENGE: &str = "MARTA_TEST";

fn params(common_name: &str, title: Option<&str>) -> CertificateParams {
    let mut params = CertificateParams::default();
    let mut name = rcgen::DistinguishedName::new();
    name.push(DnType::CommonName, common_name);
    if let Some(title) = title {
        name.push(DnType::CustomDnType(vec![2, 5, 4, 12]), title);
    }
    params.distinguished_name = name;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
}

/// Base64 encoded `[leaf, intermediate, root]`, the intermediate optionally
/// titled StrongBox.
fn generate_chain(strongbox: bool) -> Vec<String> {
    let root_key = KeyPair::generate().unwrap();
    let root = params("Test Attestation Root", None)
        .self_signed(&root_key)
        .unwrap();
    let intermediate_key = KeyPair::generate().unwrap();
    let intermediate = params("Test Intermediate", strongbox.then_some("StrongBox"))
        .signed_by(&intermediate_key, &root, &root_key)
        .unwrap();
    let leaf_key = KeyPair::generate().unwrap();
    let leaf = params("Android Keystore Key", None)
        .signed_by(&leaf_key, &intermediate, &intermediate_key)
        .unwrap();
    [leaf.der(), intermediate.der(), root.der()]
        .into_iter()
        .map(|der| STANDARD.encode(der))
        .collect()
}

async fn spawn_server(verifier: AttestationVerifier, timeout: Duration, max_body: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(serve(
        listener,
        router(AppState::new(verifier, timeout), max_body),
    ));
    format!("http://{address}/attestation")
}

async fn default_server() -> String {
    spawn_server(
        AttestationVerifier::default(),
        Duration::from_secs(10),
        DEFAULT_MAX_BODY_BYTES,
    )
    .await
}

#[tokio::test]
async fn test_accepted_attestation() {
    let url = default_server().await;
    let response = reqwest::Client::new()
        .post(&url)
        .json(&json!({ "challenge": CHALLENGE, "certChain": generate_chain(true) }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "status": "ok",
            "message": "Attestation verified on server",
            "securityLevel": "StrongBox"
        })
    );
}

#[tokio::test]
async fn test_rejected_attestation() {
    let url = default_server().await;
    let response = reqwest::Client::new()
        .post(&url)
        .json(&json!({ "challenge": CHALLENGE, "certChain": generate_chain(false) }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: VerificationResponse = response.json().await.unwrap();
    assert_eq!(body.status, "error");
    assert!(body.message.contains("not StrongBox-backed"));
    assert!(body.security_level.is_none());
}

#[tokio::test]
async fn test_missing_fields() {
    let url = default_server().await;
    let response = reqwest::Client::new()
        .post(&url)
        .json(&json!({ "challenge": CHALLENGE }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: VerificationResponse = response.json().await.unwrap();
    assert_eq!(body.message, "Missing 'challenge' or 'certChain'");
}

#[tokio::test]
async fn test_invalid_json_body() {
    let url = default_server().await;
    for payload in ["this is not json", "[1, 2, 3]", ""] {
        let response = reqwest::Client::new()
            .post(&url)
            .body(payload)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: VerificationResponse = response.json().await.unwrap();
        assert_eq!(body, VerificationResponse::error(INVALID_JSON_MESSAGE));
    }
}

#[tokio::test]
async fn test_oversized_body_is_refused() {
    let url = spawn_server(AttestationVerifier::default(), Duration::from_secs(10), 64).await;
    let response = reqwest::Client::new()
        .post(&url)
        .json(&json!({ "challenge": CHALLENGE, "certChain": generate_chain(true) }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

struct SlowClassifier;

impl HardwareClassifier for SlowClassifier {
    fn classify(&self, _chain: &CertificateChain) -> SecurityLevel {
        std::thread::sleep(Duration::from_millis(500));
        SecurityLevel::StrongBox
    }
}

#[tokio::test]
async fn test_verification_timeout() {
    let verifier = AttestationVerifier::builder()
        .classifier(SlowClassifier)
        .build();
    let url = spawn_server(verifier, Duration::from_millis(50), DEFAULT_MAX_BODY_BYTES).await;
    let response = reqwest::Client::new()
        .post(&url)
        .json(&json!({ "challenge": CHALLENGE, "certChain": generate_chain(true) }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: VerificationResponse = response.json().await.unwrap();
    assert_eq!(body.message, TIMEOUT_MESSAGE);
}

#[test]
fn test_config_defaults() {
    let config = ServerConfig::try_parse_from(["key-attestation-server"]).unwrap();
    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.port, 5000);
    assert_eq!(config.bind_address(), "0.0.0.0:5000");
    assert!(config.trusted_roots.is_empty());
    assert_eq!(config.classifier, ClassifierKind::SubjectMarker);
    assert_eq!(config.marker, "StrongBox");
    assert_eq!(config.required_level, RequiredLevel::StrongBox);
    assert!(!config.bind_challenge);
    assert_eq!(config.max_chain_length, 10);
    assert_eq!(config.request_timeout(), Duration::from_secs(10));
    assert_eq!(config.max_body_bytes, 262144);

    let verifier = config.build_verifier().unwrap();
    assert_eq!(verifier.policy().required_level, SecurityLevel::StrongBox);
}

#[test]
fn test_config_flags() {
    let first = "aa".repeat(32);
    let second = "bb".repeat(32);
    let roots = format!("{first},{second}");
    let config = ServerConfig::try_parse_from([
        "key-attestation-server",
        "--port",
        "8080",
        "--trusted-root",
        roots.as_str(),
        "--classifier",
        "attestation-extension",
        "--required-level",
        "trusted-environment",
        "--bind-challenge",
    ])
    .unwrap();
    assert_eq!(config.trusted_roots, vec![first, second]);
    assert_eq!(config.classifier, ClassifierKind::AttestationExtension);
    assert!(config.bind_challenge);

    let verifier = config.build_verifier().unwrap();
    assert_eq!(
        verifier.policy().required_level,
        SecurityLevel::TrustedEnvironment
    );
}

#[test]
fn test_invalid_trusted_root() {
    let config =
        ServerConfig::try_parse_from(["key-attestation-server", "--trusted-root", "abcd"])
            .unwrap();
    assert!(matches!(
        config.build_verifier(),
        Err(ServerError::Config(_))
    ));
}

#[test]
fn test_unknown_required_level() {
    assert!(
        ServerConfig::try_parse_from(["key-attestation-server", "--required-level", "unknown"])
            .is_err()
    );
}
