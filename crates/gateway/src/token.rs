//! # 署名付きケーパビリティトークン
//!
//! 改ざん検知可能で時限付きのトークンの発行と検証。
//! ペイロードをBase64url(JSON)にエンコードし、`token + "." + expires` に対する
//! HMAC-SHA256署名を付与する。検証はタイミングセーフな比較で行い、
//! デコード・パースの失敗はエラーではなく `None` として扱う。
//! HTTPステータスへの変換は呼び出し側の責務。

use base64::Engine;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha256;

use asset_sync_types::SignedToken;

use crate::config::now_unix;
use crate::error::ApiError;

/// Base64urlエンジン（パディングなし）
fn b64url() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
}

/// トークンの発行・検証を行う署名器。
/// シークレットからインポートしたHMAC鍵を保持し、操作ごとの再インポートを避ける。
#[derive(Clone)]
pub struct TokenSigner {
    mac: Hmac<Sha256>,
}

impl TokenSigner {
    /// シークレット文字列から署名器を構築する。
    pub fn new(secret: &str) -> Result<Self, ApiError> {
        let mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|e| ApiError::Internal(format!("HMAC鍵のインポートに失敗: {e}")))?;
        Ok(Self { mac })
    }

    /// `token + "." + expires` に対する署名をBase64urlで返す。
    fn sign(&self, message: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(message);
        b64url().encode(mac.finalize().into_bytes())
    }

    /// ペイロードをエンコードし、TTL秒後に失効するトークンを発行する。
    pub fn create<T: Serialize>(
        &self,
        payload: &T,
        ttl_seconds: u64,
    ) -> Result<SignedToken, ApiError> {
        let json = serde_json::to_vec(payload)
            .map_err(|e| ApiError::Internal(format!("トークンペイロードのシリアライズに失敗: {e}")))?;
        let token = b64url().encode(&json);
        let expires = now_unix() + ttl_seconds;
        let signature = self.sign(format!("{token}.{expires}").as_bytes());

        Ok(SignedToken {
            token,
            expires,
            signature,
        })
    }

    /// トークンを検証し、成功時はデコード済みペイロードを返す。
    ///
    /// 以下のいずれかで `None` を返す:
    /// - `expires` が数値でない、または既に過去
    /// - 署名が一致しない（タイミングセーフ比較）
    /// - Base64urlデコードまたはJSONパースの失敗
    pub fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        expires: &str,
        signature: &str,
    ) -> Option<T> {
        let expires_at: u64 = expires.trim().parse().ok()?;
        if now_unix() >= expires_at {
            return None;
        }

        let expected = self.sign(format!("{token}.{expires}").as_bytes());
        if !timing_safe_eq(expected.as_bytes(), signature.as_bytes()) {
            return None;
        }

        let json = b64url().decode(token).ok()?;
        serde_json::from_slice(&json).ok()
    }
}

/// タイミングセーフなバイト列比較。
/// 長い方のオペランド全体をXORで畳み込み、長さ・内容の不一致で早期脱出しない。
pub fn timing_safe_eq(a: &[u8], b: &[u8]) -> bool {
    let mut diff = a.len() ^ b.len();
    let max_len = a.len().max(b.len());
    for i in 0..max_len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= usize::from(x ^ y);
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_sync_types::AssetDescriptor;

    fn descriptor() -> AssetDescriptor {
        AssetDescriptor {
            key: "img/a.png".to_string(),
            relative_path: "img/a.png".to_string(),
            finder_tag: Some("kancolle".to_string()),
            declared_size: 12,
            content_type: "image/png".to_string(),
            user_id: "user-1".to_string(),
            uploader_email: Some("user@example.com".to_string()),
            file_name: Some("a.png".to_string()),
        }
    }

    /// 発行したトークンが失効前に元のペイロードへ復元されることを確認
    #[test]
    fn test_create_verify_roundtrip() {
        let signer = TokenSigner::new("secret").unwrap();
        let issued = signer.create(&descriptor(), 120).unwrap();

        let verified: AssetDescriptor = signer
            .verify(&issued.token, &issued.expires.to_string(), &issued.signature)
            .expect("検証に失敗");
        assert_eq!(verified, descriptor());
    }

    /// トークン・有効期限・署名のいずれを改ざんしても検証が失敗することを確認
    #[test]
    fn test_tampered_fields_fail() {
        let signer = TokenSigner::new("secret").unwrap();
        let issued = signer.create(&descriptor(), 120).unwrap();
        let expires = issued.expires.to_string();

        let mut token = issued.token.clone();
        token.replace_range(0..1, if token.starts_with('A') { "B" } else { "A" });
        assert!(signer
            .verify::<AssetDescriptor>(&token, &expires, &issued.signature)
            .is_none());

        let later = (issued.expires + 1).to_string();
        assert!(signer
            .verify::<AssetDescriptor>(&issued.token, &later, &issued.signature)
            .is_none());

        let mut signature = issued.signature.clone();
        signature.replace_range(0..1, if signature.starts_with('A') { "B" } else { "A" });
        assert!(signer
            .verify::<AssetDescriptor>(&issued.token, &expires, &signature)
            .is_none());
    }

    /// 正しい署名でも有効期限切れのトークンは拒否されることを確認
    #[test]
    fn test_expired_token_fails() {
        let signer = TokenSigner::new("secret").unwrap();
        let json = serde_json::to_vec(&descriptor()).unwrap();
        let token = b64url().encode(&json);
        let expires = now_unix().saturating_sub(10);
        let signature = signer.sign(format!("{token}.{expires}").as_bytes());

        assert!(signer
            .verify::<AssetDescriptor>(&token, &expires.to_string(), &signature)
            .is_none());
    }

    /// 別のシークレットで発行したトークンが拒否されることを確認
    #[test]
    fn test_wrong_secret_fails() {
        let signer = TokenSigner::new("secret").unwrap();
        let other = TokenSigner::new("other-secret").unwrap();
        let issued = signer.create(&descriptor(), 120).unwrap();

        assert!(other
            .verify::<AssetDescriptor>(
                &issued.token,
                &issued.expires.to_string(),
                &issued.signature
            )
            .is_none());
    }

    /// タイミングセーフ比較の基本性質を確認
    #[test]
    fn test_timing_safe_eq() {
        assert!(timing_safe_eq(b"abc", b"abc"));
        assert!(!timing_safe_eq(b"abc", b"abd"));
        assert!(!timing_safe_eq(b"abc", b"abcd"));
        assert!(!timing_safe_eq(b"", b"a"));
        assert!(timing_safe_eq(b"", b""));
    }
}
