//! Web Push transport (RFC 8030) with VAPID (RFC 8292) and `aes128gcm`
//! payload encryption (RFC 8291).

use std::time::Duration;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes128Gcm, KeyInit, Nonce};
use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use dashmap::DashMap;
use hkdf::Hkdf;
use p256::ecdh::EphemeralSecret;
use p256::ecdsa::SigningKey;
use p256::ecdsa::signature::Signer;
use p256::elliptic_curve::rand_core::{OsRng, RngCore};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, info, warn};
use url::Url;

use super::{DeliveryError, PushTransport, ReminderPayload};
use crate::domain::PushSubscription;
use crate::utils::http_client::build_client;
use crate::{Error, Result};

const SALT_LEN: usize = 16;
const PUBLIC_KEY_LEN: usize = 65;
const AUTH_SECRET_LEN: usize = 16;
const DEFAULT_RS: u32 = 4096;
const MAX_PAYLOAD_BYTES: usize = 3500;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);
const PUSH_TTL_SECS: &str = "3600";
const VAPID_JWT_EXP_SECS: i64 = 12 * 60 * 60;
const VAPID_JWT_SKEW_SECS: i64 = 60;
const DEFAULT_VAPID_SUBJECT: &str = "mailto:example@yourdomain.com";

const IKM_INFO_PREFIX: &str = "WebPush: info\0";
const KEY_INFO: &str = "Content-Encoding: aes128gcm\0";
const NONCE_INFO: &str = "Content-Encoding: nonce\0";

#[derive(Debug, Clone)]
struct CachedVapidJwt {
    jwt: String,
    exp_unix: i64,
}

/// VAPID identity of this server.
#[derive(Clone)]
pub struct WebPushConfig {
    vapid_public_key_b64: String,
    vapid_private_key_raw: [u8; 32],
    vapid_subject: String,
}

impl WebPushConfig {
    /// Load `VAPID_PUBLIC_KEY`, `VAPID_PRIVATE_KEY` and `VAPID_SUBJECT`.
    ///
    /// Returns `Ok(None)` when neither key is set; setting only one of them is
    /// a configuration error.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`WebPushConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let read = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let (public, private) = match (read("VAPID_PUBLIC_KEY"), read("VAPID_PRIVATE_KEY")) {
            (None, None) => return Ok(None),
            (Some(public), Some(private)) => (public, private),
            _ => {
                return Err(Error::config(
                    "Both VAPID_PUBLIC_KEY and VAPID_PRIVATE_KEY must be set",
                ));
            }
        };
        let subject = read("VAPID_SUBJECT").unwrap_or_else(|| DEFAULT_VAPID_SUBJECT.to_string());

        Self::from_keys(public, &private, subject).map(Some)
    }

    /// Build from base64url-encoded keys.
    pub fn from_keys(
        vapid_public_key_b64: String,
        vapid_private_key_b64: &str,
        vapid_subject: String,
    ) -> Result<Self> {
        let public_raw = decode_b64url(&vapid_public_key_b64)
            .map_err(|e| Error::config(format!("Invalid VAPID_PUBLIC_KEY: {}", e)))?;
        let private_raw = decode_b64url(vapid_private_key_b64)
            .map_err(|e| Error::config(format!("Invalid VAPID_PRIVATE_KEY: {}", e)))?;

        if public_raw.len() != PUBLIC_KEY_LEN {
            return Err(Error::config(format!(
                "VAPID_PUBLIC_KEY must decode to {} bytes",
                PUBLIC_KEY_LEN
            )));
        }
        let private_raw: [u8; 32] = private_raw
            .try_into()
            .map_err(|_| Error::config("VAPID_PRIVATE_KEY must decode to 32 bytes"))?;

        let derived_public = SigningKey::from_bytes((&private_raw).into())
            .map_err(|_| Error::config("VAPID_PRIVATE_KEY is not a valid P-256 scalar"))?
            .verifying_key()
            .to_encoded_point(false);
        if derived_public.as_bytes() != public_raw.as_slice() {
            return Err(Error::config(
                "VAPID_PUBLIC_KEY does not belong to VAPID_PRIVATE_KEY",
            ));
        }

        Ok(Self {
            vapid_public_key_b64,
            vapid_private_key_raw: private_raw,
            vapid_subject,
        })
    }

    /// Fresh random key pair.
    pub fn generate(vapid_subject: impl Into<String>) -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let public_raw = signing_key.verifying_key().to_encoded_point(false);
        let mut private_raw = [0u8; 32];
        private_raw.copy_from_slice(&signing_key.to_bytes());

        Self {
            vapid_public_key_b64: encode_b64url(public_raw.as_bytes()),
            vapid_private_key_raw: private_raw,
            vapid_subject: vapid_subject.into(),
        }
    }

    /// Load from the environment, or generate an ephemeral pair and log it.
    pub fn from_env_or_generate() -> Result<Self> {
        if let Some(config) = Self::from_env()? {
            return Ok(config);
        }

        let config = Self::generate(DEFAULT_VAPID_SUBJECT);
        warn!(
            public_key = %config.vapid_public_key_b64(),
            private_key = %config.vapid_private_key_b64(),
            "No VAPID keys configured; generated an ephemeral pair. \
             Export VAPID_PUBLIC_KEY and VAPID_PRIVATE_KEY to keep subscriptions valid across restarts"
        );
        Ok(config)
    }

    pub fn vapid_public_key_b64(&self) -> &str {
        &self.vapid_public_key_b64
    }

    pub fn vapid_private_key_b64(&self) -> String {
        encode_b64url(&self.vapid_private_key_raw)
    }

    pub fn vapid_subject(&self) -> &str {
        &self.vapid_subject
    }
}

impl std::fmt::Debug for WebPushConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebPushConfig")
            .field("vapid_public_key", &self.vapid_public_key_b64)
            .field("vapid_subject", &self.vapid_subject)
            .finish_non_exhaustive()
    }
}

/// Web Push delivery over HTTP.
#[derive(Debug)]
pub struct WebPushTransport {
    config: WebPushConfig,
    client: reqwest::Client,
    vapid_jwt_cache: DashMap<String, CachedVapidJwt>,
}

impl WebPushTransport {
    pub fn new(config: WebPushConfig) -> Result<Self> {
        Ok(Self {
            config,
            client: build_client(REQUEST_TIMEOUT)?,
            vapid_jwt_cache: DashMap::new(),
        })
    }

    pub fn vapid_public_key(&self) -> &str {
        self.config.vapid_public_key_b64()
    }

    async fn post(
        &self,
        endpoint: &str,
        body: Vec<u8>,
        salt_b64: &str,
        crypto_key: &str,
        authorization: &str,
    ) -> std::result::Result<reqwest::Response, DeliveryError> {
        self.client
            .post(endpoint)
            .header("TTL", PUSH_TTL_SECS)
            .header("Content-Encoding", "aes128gcm")
            .header("Content-Type", "application/octet-stream")
            .header("Encryption", format!("salt={}", salt_b64))
            .header("Crypto-Key", crypto_key)
            .header("Authorization", authorization)
            .header("Urgency", "normal")
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::transient(format!("Web push request failed: {}", e)))
    }

    fn get_or_build_vapid_jwt(&self, aud: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        if let Some(entry) = self.vapid_jwt_cache.get(aud)
            && entry.exp_unix - VAPID_JWT_SKEW_SECS > now
        {
            return Ok(entry.jwt.clone());
        }

        let (jwt, exp_unix) = build_vapid_jwt_with_exp(
            aud,
            &self.config.vapid_subject,
            &self.config.vapid_private_key_raw,
            VAPID_JWT_EXP_SECS,
        )?;
        self.vapid_jwt_cache.insert(
            aud.to_string(),
            CachedVapidJwt {
                jwt: jwt.clone(),
                exp_unix,
            },
        );
        Ok(jwt)
    }

    fn prepare(
        &self,
        handle: &PushSubscription,
        payload: &ReminderPayload,
    ) -> Result<(Vec<u8>, String, String, String)> {
        let aud = push_service_audience(&handle.endpoint)?;
        let jwt = self.get_or_build_vapid_jwt(&aud)?;
        let payload_bytes = payload.to_bytes_capped(MAX_PAYLOAD_BYTES)?;

        let client_pub_raw: [u8; PUBLIC_KEY_LEN] = decode_b64url(&handle.keys.p256dh)
            .map_err(|e| Error::Other(format!("Invalid p256dh key: {}", e)))?
            .try_into()
            .map_err(|_| Error::Other("Invalid p256dh key length".to_string()))?;
        let client_auth: [u8; AUTH_SECRET_LEN] = decode_b64url(&handle.keys.auth)
            .map_err(|e| Error::Other(format!("Invalid auth key: {}", e)))?
            .try_into()
            .map_err(|_| Error::Other("Invalid auth secret length".to_string()))?;

        let (body, salt_b64, dh_b64) =
            encrypt_aes128gcm(&payload_bytes, &client_pub_raw, &client_auth)?;

        let crypto_key = format!(
            "dh={}; p256ecdsa={}",
            dh_b64, self.config.vapid_public_key_b64
        );
        let authorization = format!("vapid t={}, k={}", jwt, self.config.vapid_public_key_b64);

        Ok((body, salt_b64, crypto_key, authorization))
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    fn transport_type(&self) -> &'static str {
        "web_push"
    }

    async fn deliver(
        &self,
        handle: &PushSubscription,
        payload: &ReminderPayload,
    ) -> std::result::Result<(), DeliveryError> {
        let (body, salt_b64, crypto_key, authorization) = self
            .prepare(handle, payload)
            .map_err(|e| DeliveryError::transient(e.to_string()))?;

        let mut response = self
            .post(&handle.endpoint, body.clone(), &salt_b64, &crypto_key, &authorization)
            .await?;

        if response.status().as_u16() == 429
            && let Some(delay) = retry_after_delay(&response)
            && delay <= MAX_RETRY_AFTER
        {
            debug!(endpoint = %handle.endpoint, delay_secs = delay.as_secs(), "Push service throttled, retrying once");
            tokio::time::sleep(delay).await;
            response = self
                .post(&handle.endpoint, body, &salt_b64, &crypto_key, &authorization)
                .await?;
        }

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        let error = DeliveryError::from_status(status.as_u16(), truncate_chars(&body_text, 500));

        if error.is_permanent() {
            info!(endpoint = %handle.endpoint, status = %status, "Push service reports subscription gone");
        }
        Err(error)
    }
}

/// Check that a browser subscription can be addressed and encrypted to.
///
/// Handles failing this can never be delivered, so they are refused up front
/// instead of failing on every window.
pub fn validate_subscription(handle: &PushSubscription) -> Result<()> {
    push_service_audience(&handle.endpoint)
        .map_err(|e| Error::validation(format!("Invalid subscription endpoint: {}", e)))?;

    let p256dh = decode_b64url(&handle.keys.p256dh)
        .map_err(|e| Error::validation(format!("Invalid p256dh key: {}", e)))?;
    if p256dh.len() != PUBLIC_KEY_LEN {
        return Err(Error::validation(format!(
            "p256dh key must decode to {} bytes, got {}",
            PUBLIC_KEY_LEN,
            p256dh.len()
        )));
    }

    let auth = decode_b64url(&handle.keys.auth)
        .map_err(|e| Error::validation(format!("Invalid auth secret: {}", e)))?;
    if auth.len() != AUTH_SECRET_LEN {
        return Err(Error::validation(format!(
            "auth secret must decode to {} bytes, got {}",
            AUTH_SECRET_LEN,
            auth.len()
        )));
    }

    Ok(())
}

fn push_service_audience(endpoint: &str) -> Result<String> {
    let url = Url::parse(endpoint)
        .map_err(|e| Error::Other(format!("Invalid push endpoint URL: {}", e)))?;
    let host = url
        .host()
        .ok_or_else(|| Error::Other("Push endpoint missing host".to_string()))?;

    let host = match host {
        url::Host::Domain(d) => d.to_string(),
        url::Host::Ipv4(ip) => ip.to_string(),
        url::Host::Ipv6(ip) => format!("[{}]", ip),
    };

    let aud = match (url.scheme(), url.port()) {
        (scheme, Some(port)) => format!("{}://{}:{}", scheme, host, port),
        (scheme, None) => format!("{}://{}", scheme, host),
    };
    Ok(aud)
}

fn retry_after_delay(response: &reqwest::Response) -> Option<Duration> {
    let header = response.headers().get("Retry-After")?;
    let value = header.to_str().ok()?.trim();
    value.parse::<u64>().ok().map(Duration::from_secs)
}

fn truncate_chars(input: &str, max_chars: usize) -> String {
    input.chars().take(max_chars).collect()
}

fn decode_b64url(input: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(input.trim_end_matches('=').as_bytes())
}

fn encode_b64url(input: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(input)
}

fn hkdf_sha256(salt: &[u8], ikm: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|_| Error::Other("HKDF expand failed".to_string()))?;
    Ok(okm)
}

fn encrypt_aes128gcm(
    plaintext: &[u8],
    remote_public_key_raw: &[u8; PUBLIC_KEY_LEN],
    auth_secret: &[u8; AUTH_SECRET_LEN],
) -> Result<(Vec<u8>, String, String)> {
    if plaintext.is_empty() {
        return Err(Error::Other("Web push payload cannot be empty".to_string()));
    }

    let mut salt = [0u8; SALT_LEN];
    let mut rng = OsRng;
    rng.fill_bytes(&mut salt);

    let remote_pub = p256::PublicKey::from_sec1_bytes(remote_public_key_raw)
        .map_err(|_| Error::Other("Invalid remote public key".to_string()))?;

    let local_secret = EphemeralSecret::random(&mut rng);
    let local_pub_point = p256::PublicKey::from(&local_secret).to_encoded_point(false);
    let local_pub_raw: [u8; PUBLIC_KEY_LEN] = local_pub_point
        .as_bytes()
        .try_into()
        .map_err(|_| Error::Other("Invalid local public key length".to_string()))?;

    let shared_secret = local_secret.diffie_hellman(&remote_pub);

    let mut ikm_info = Vec::with_capacity(IKM_INFO_PREFIX.len() + PUBLIC_KEY_LEN * 2);
    ikm_info.extend_from_slice(IKM_INFO_PREFIX.as_bytes());
    ikm_info.extend_from_slice(remote_public_key_raw);
    ikm_info.extend_from_slice(&local_pub_raw);

    let ikm = hkdf_sha256(
        auth_secret,
        shared_secret.raw_secret_bytes().as_slice(),
        &ikm_info,
        32,
    )?;
    let cek = hkdf_sha256(&salt, &ikm, KEY_INFO.as_bytes(), 16)?;
    let nonce = hkdf_sha256(&salt, &ikm, NONCE_INFO.as_bytes(), 12)?;

    let cipher = Aes128Gcm::new_from_slice(&cek)
        .map_err(|_| Error::Other("Invalid CEK length".to_string()))?;

    // Single record: plaintext followed by the final-record delimiter.
    let mut padded = Vec::with_capacity(plaintext.len() + 1);
    padded.extend_from_slice(plaintext);
    padded.push(2);

    // With one record the sequence number is 0, so the IV is the nonce itself.
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), padded.as_slice())
        .map_err(|_| Error::Other("AES-GCM encryption failed".to_string()))?;

    let mut body = Vec::with_capacity(SALT_LEN + 4 + 1 + PUBLIC_KEY_LEN + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&DEFAULT_RS.to_be_bytes());
    body.push(PUBLIC_KEY_LEN as u8);
    body.extend_from_slice(&local_pub_raw);
    body.extend_from_slice(&ciphertext);

    Ok((body, encode_b64url(&salt), encode_b64url(&local_pub_raw)))
}

fn build_vapid_jwt_with_exp(
    aud: &str,
    subject: &str,
    private_key_raw: &[u8; 32],
    exp_secs: i64,
) -> Result<(String, i64)> {
    #[derive(Serialize)]
    struct Claims<'a> {
        aud: &'a str,
        exp: u64,
        sub: &'a str,
    }

    let header = serde_json::json!({ "typ": "JWT", "alg": "ES256" });
    let exp_unix = (Utc::now() + chrono::Duration::seconds(exp_secs)).timestamp();
    let claims = Claims {
        aud,
        exp: exp_unix as u64,
        sub: subject,
    };

    let header_b64 = encode_b64url(serde_json::to_string(&header)?.as_bytes());
    let claims_b64 = encode_b64url(serde_json::to_string(&claims)?.as_bytes());
    let signing_input = format!("{}.{}", header_b64, claims_b64);

    let signing_key = SigningKey::from_bytes(private_key_raw.into())
        .map_err(|_| Error::Other("Invalid VAPID private key".to_string()))?;
    let sig: p256::ecdsa::Signature = signing_key.sign(signing_input.as_bytes());
    let sig_b64 = encode_b64url(sig.to_bytes().as_slice());

    Ok((format!("{}.{}", signing_input, sig_b64), exp_unix))
}
