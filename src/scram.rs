//! SCRAM-SHA-1 and SCRAM-SHA-256 client steppers.
//!
//! Implements the Salted Challenge Response Authentication Mechanism as
//! specified in RFC 5802 (SHA-1) and RFC 7677 (SHA-256).
//!
//! # Protocol Overview
//!
//! SCRAM provides:
//! - Password never sent in plaintext
//! - Mutual authentication (client verifies server)
//! - Protection against replay attacks via nonces
//!
//! # Exchange
//!
//! ```text
//! step(None)          -> client-first   "n,,n=user,r=<client nonce>"
//! step(server-first)  -> client-final   "c=biws,r=<nonce>,p=<proof>"
//! step(server-final)  -> ""  (done, after the server signature verifies)
//! ```
//!
//! Channel binding is not supported; the GS2 header is always `n,,`.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use crate::credential::Credential;
use crate::error::{Result, SaslError};
use crate::mechanism::Mechanism;
use crate::sasl::{Stepper, StepperState};

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Base64 of the GS2 header `n,,` (no channel binding, no authzid).
const CHANNEL_BINDING: &str = "biws";

/// Number of random bytes in a client nonce.
const NONCE_LEN: usize = 18;

/// Ceiling on server-chosen iteration counts. Deployments use 10k to 15k.
const MAX_ITERATIONS: u32 = 1_000_000;

/// Hash function a SCRAM variant is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScramHash {
    Sha1,
    Sha256,
}

impl ScramHash {
    pub fn mechanism(self) -> Mechanism {
        match self {
            ScramHash::Sha1 => Mechanism::ScramSha1,
            ScramHash::Sha256 => Mechanism::ScramSha256,
        }
    }

    /// Lowest iteration count accepted from a server.
    ///
    /// RFC 7677 sets 4096 as the floor for SHA-256. RFC 5802 sets none for
    /// SHA-1, and older servers are configured well below 4096.
    pub fn min_iterations(self) -> u32 {
        match self {
            ScramHash::Sha1 => 1,
            ScramHash::Sha256 => 4096,
        }
    }

    /// Highest iteration count accepted from a server.
    ///
    /// Hi() runs synchronously on the caller's task, out of reach of the
    /// negotiation timeout, so the server must not pick an unbounded count.
    pub fn max_iterations(self) -> u32 {
        MAX_ITERATIONS
    }

    fn hmac(self, key: &[u8], msg: &[u8]) -> Vec<u8> {
        match self {
            ScramHash::Sha1 => {
                let mut mac =
                    HmacSha1::new_from_slice(key).expect("HMAC key length is always valid");
                mac.update(msg);
                mac.finalize().into_bytes().to_vec()
            }
            ScramHash::Sha256 => {
                let mut mac =
                    HmacSha256::new_from_slice(key).expect("HMAC key length is always valid");
                mac.update(msg);
                mac.finalize().into_bytes().to_vec()
            }
        }
    }

    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            ScramHash::Sha1 => Sha1::digest(data).to_vec(),
            ScramHash::Sha256 => Sha256::digest(data).to_vec(),
        }
    }

    /// Hi() from RFC 5802, which is PBKDF2 with this hash's HMAC.
    fn hi(self, password: &[u8], salt: &[u8], iters: u32) -> Vec<u8> {
        // U1 = HMAC(password, salt || INT(1))
        let mut s1 = Vec::with_capacity(salt.len() + 4);
        s1.extend_from_slice(salt);
        s1.extend_from_slice(&1u32.to_be_bytes());

        let mut u = Zeroizing::new(self.hmac(password, &s1));
        let mut out = u.to_vec();

        // Ui = HMAC(password, U(i-1)), result = U1 XOR U2 XOR ... XOR Ui
        for _ in 1..iters {
            u = Zeroizing::new(self.hmac(password, &u));
            for (o, ui) in out.iter_mut().zip(u.iter()) {
                *o ^= *ui;
            }
        }

        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    ClientFirst,
    ServerFirst,
    ServerFinal,
}

/// SCRAM client stepper.
///
/// The salted password and auth message are only held between the
/// server-first and server-final rounds, and are wiped when the exchange
/// ends either way.
pub struct ScramClient {
    hash: ScramHash,
    password: String,
    client_nonce_b64: String,
    client_first_bare: String,
    salted_password: Vec<u8>,
    auth_message: String,
    round: Round,
    state: StepperState,
}

impl ScramClient {
    /// Create a new SCRAM client with a random nonce.
    ///
    /// `password` goes into Hi() unchanged: no SASLprep, and no MongoDB
    /// pre-hashing for SCRAM-SHA-1 (see `sha1_from_credential`).
    pub fn new(hash: ScramHash, username: &str, password: &str) -> Self {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        Self::with_nonce(hash, username, password, &B64.encode(nonce))
    }

    /// Create a SCRAM client with a specific nonce.
    pub(crate) fn with_nonce(
        hash: ScramHash,
        username: &str,
        password: &str,
        nonce_b64: &str,
    ) -> Self {
        let user = sasl_escape_username(username);
        Self {
            hash,
            password: password.to_string(),
            client_nonce_b64: nonce_b64.to_string(),
            client_first_bare: format!("n={user},r={nonce_b64}"),
            salted_password: Vec::new(),
            auth_message: String::new(),
            round: Round::ClientFirst,
            state: StepperState::NotStarted,
        }
    }

    /// Registry constructor for SCRAM-SHA-1.
    ///
    /// The credential password is used as given. MongoDB expects SCRAM-SHA-1
    /// clients to use the hex MD5 digest of `<username>:mongo:<password>` as
    /// the password, so callers talking to MongoDB pass that digest in the
    /// credential.
    pub(crate) fn sha1_from_credential(
        credential: &Credential,
        _host: &str,
    ) -> Result<Box<dyn Stepper>> {
        Ok(Box::new(Self::new(
            ScramHash::Sha1,
            credential.username(),
            credential.password(),
        )))
    }

    pub(crate) fn sha256_from_credential(
        credential: &Credential,
        _host: &str,
    ) -> Result<Box<dyn Stepper>> {
        Ok(Box::new(Self::new(
            ScramHash::Sha256,
            credential.username(),
            credential.password(),
        )))
    }

    fn advance(&mut self, challenge: Option<&[u8]>) -> Result<(Vec<u8>, bool)> {
        match (self.round, challenge) {
            (Round::ClientFirst, None | Some([])) => {
                self.round = Round::ServerFirst;
                Ok((format!("n,,{}", self.client_first_bare).into_bytes(), false))
            }
            (Round::ClientFirst, Some(_)) => Err(SaslError::auth(
                "SCRAM server sent a challenge before client-first",
            )),
            (Round::ServerFirst, Some(server_first)) => {
                let server_first = utf8(server_first, "server-first")?;
                let client_final = self.client_final(server_first)?;
                self.round = Round::ServerFinal;
                Ok((client_final.into_bytes(), false))
            }
            (Round::ServerFinal, Some(server_final)) => {
                let server_final = utf8(server_final, "server-final")?;
                self.verify_server_final(server_final)?;
                Ok((Vec::new(), true))
            }
            (_, None) => Err(SaslError::auth("SCRAM expected a server challenge")),
        }
    }

    /// Compute client-final-message and keep what server verification needs.
    fn client_final(&mut self, server_first: &str) -> Result<String> {
        let ServerFirst { nonce, salt_b64, iterations } = parse_server_first(server_first)?;

        // Server nonce must extend ours
        if !nonce.starts_with(&self.client_nonce_b64)
            || nonce.len() == self.client_nonce_b64.len()
        {
            return Err(SaslError::auth(
                "SCRAM nonce mismatch: server nonce doesn't extend client nonce",
            ));
        }

        if iterations < self.hash.min_iterations() {
            return Err(SaslError::auth(format!(
                "SCRAM iteration count {iterations} below minimum {}",
                self.hash.min_iterations()
            )));
        }
        if iterations > self.hash.max_iterations() {
            return Err(SaslError::auth(format!(
                "SCRAM iteration count {iterations} above maximum {}",
                self.hash.max_iterations()
            )));
        }

        let salt = B64
            .decode(salt_b64.as_bytes())
            .map_err(|e| SaslError::auth(format!("SCRAM invalid salt base64: {e}")))?;

        let client_final_wo_proof = format!("c={CHANNEL_BINDING},r={nonce}");
        self.auth_message = format!(
            "{},{},{}",
            self.client_first_bare, server_first, client_final_wo_proof
        );

        // SCRAM key derivation
        self.salted_password = self.hash.hi(self.password.as_bytes(), &salt, iterations);
        self.password.zeroize();
        let client_key = Zeroizing::new(self.hash.hmac(&self.salted_password, b"Client Key"));
        let stored_key = Zeroizing::new(self.hash.digest(&client_key));

        // Compute proof
        let client_sig = Zeroizing::new(self.hash.hmac(&stored_key, self.auth_message.as_bytes()));
        let proof = xor_bytes(&client_key, &client_sig);

        Ok(format!("{client_final_wo_proof},p={}", B64.encode(proof)))
    }

    /// Verify server-final-message, which proves the server knows the password.
    fn verify_server_final(&self, server_final: &str) -> Result<()> {
        if let Some(err) = server_final.split(',').find_map(|p| p.strip_prefix("e=")) {
            return Err(SaslError::auth(format!("SCRAM server error: {err}")));
        }

        let v = server_final
            .split(',')
            .find_map(|p| p.strip_prefix("v="))
            .ok_or_else(|| SaslError::auth("SCRAM server-final missing signature (v=)"))?;

        let server_sig = B64
            .decode(v.trim().as_bytes())
            .map_err(|e| SaslError::auth(format!("SCRAM invalid server signature base64: {e}")))?;

        let server_key = Zeroizing::new(self.hash.hmac(&self.salted_password, b"Server Key"));
        let expected = self.hash.hmac(&server_key, self.auth_message.as_bytes());

        if !constant_time_eq(&server_sig, &expected) {
            return Err(SaslError::auth(
                "SCRAM server signature mismatch: server may not know the password",
            ));
        }

        Ok(())
    }

    fn wipe(&mut self) {
        self.password.zeroize();
        self.salted_password.zeroize();
        self.auth_message.zeroize();
    }
}

impl Stepper for ScramClient {
    fn mechanism(&self) -> Mechanism {
        self.hash.mechanism()
    }

    fn state(&self) -> StepperState {
        self.state
    }

    fn step(&mut self, challenge: Option<&[u8]>) -> Result<(Vec<u8>, bool)> {
        self.state.ensure_steppable(self.hash.mechanism())?;
        let outcome = self.advance(challenge);
        if self.state.record(&outcome) {
            self.wipe();
        }
        outcome
    }
}

impl Drop for ScramClient {
    fn drop(&mut self) {
        self.wipe();
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ServerFirst {
    nonce: String,
    salt_b64: String,
    iterations: u32,
}

/// Parse server-first-message.
///
/// Fields may appear in any order; unknown optional extensions are ignored.
fn parse_server_first(server_first: &str) -> Result<ServerFirst> {
    let mut r = None;
    let mut s = None;
    let mut i = None;

    for part in server_first.split(',') {
        if let Some(v) = part.strip_prefix("r=") {
            r = Some(v.to_string());
        } else if let Some(v) = part.strip_prefix("s=") {
            s = Some(v.to_string());
        } else if let Some(v) = part.strip_prefix("i=") {
            i = v.parse::<u32>().ok();
        } else if let Some(v) = part.strip_prefix("e=") {
            return Err(SaslError::auth(format!("SCRAM server error: {v}")));
        } else if part.starts_with("m=") {
            return Err(SaslError::auth(
                "SCRAM server-first requires an unsupported mandatory extension (m=)",
            ));
        }
    }

    Ok(ServerFirst {
        nonce: r.ok_or_else(|| SaslError::auth("SCRAM server-first missing nonce (r=)"))?,
        salt_b64: s.ok_or_else(|| SaslError::auth("SCRAM server-first missing salt (s=)"))?,
        iterations: i.ok_or_else(|| {
            SaslError::auth("SCRAM server-first missing or invalid iteration count (i=)")
        })?,
    })
}

fn utf8<'a>(payload: &'a [u8], what: &str) -> Result<&'a str> {
    std::str::from_utf8(payload)
        .map_err(|_| SaslError::auth(format!("SCRAM {what} is not valid UTF-8")))
}

/// SASL-escape a username per RFC 5802.
///
/// Escapes `=` as `=3D` and `,` as `=2C`.
fn sasl_escape_username(u: &str) -> String {
    u.replace('=', "=3D").replace(',', "=2C")
}

fn xor_bytes(a: &[u8], b: &[u8]) -> Vec<u8> {
    debug_assert_eq!(a.len(), b.len(), "XOR operands must have equal length");
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}

/// Constant-time byte slice comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let result = a
        .iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 5802 section 5
    const SHA1_NONCE: &str = "fyko+d2lbbFgONRv9qkxdawL";
    const SHA1_SERVER_FIRST: &str =
        "r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096";
    const SHA1_CLIENT_FINAL: &str =
        "c=biws,r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,p=v0X8v3Bz2T0CJGbJQyF0X+HI4Ts=";
    const SHA1_SERVER_FINAL: &str = "v=rmF9pqV8S7suAoZWja4dJRkFsKQ=";

    // RFC 7677 section 3
    const SHA256_NONCE: &str = "rOprNGfwEbeRWgbNEkqO";
    const SHA256_SERVER_FIRST: &str =
        "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
    const SHA256_CLIENT_FINAL: &str = concat!(
        "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,",
        "p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ="
    );
    const SHA256_SERVER_FINAL: &str = "v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=";

    fn run_transcript(
        hash: ScramHash,
        nonce: &str,
        server_first: &str,
        client_final: &str,
        server_final: &str,
    ) {
        let mut c = ScramClient::with_nonce(hash, "user", "pencil", nonce);

        let (first, done) = c.step(None).unwrap();
        assert!(!done);
        assert_eq!(first, format!("n,,n=user,r={nonce}").into_bytes());
        assert_eq!(c.state(), StepperState::AwaitingServerChallenge);

        let (fin, done) = c.step(Some(server_first.as_bytes())).unwrap();
        assert!(!done);
        assert_eq!(String::from_utf8(fin).unwrap(), client_final);

        let (last, done) = c.step(Some(server_final.as_bytes())).unwrap();
        assert!(done);
        assert!(last.is_empty());
        assert_eq!(c.state(), StepperState::Completed);
        assert!(c.salted_password.is_empty());

        let err = c.step(Some(b"")).unwrap_err();
        assert!(matches!(err, SaslError::InvalidState { .. }));
    }

    #[test]
    fn sha1_rfc5802_transcript() {
        run_transcript(
            ScramHash::Sha1,
            SHA1_NONCE,
            SHA1_SERVER_FIRST,
            SHA1_CLIENT_FINAL,
            SHA1_SERVER_FINAL,
        );
    }

    #[test]
    fn sha256_rfc7677_transcript() {
        run_transcript(
            ScramHash::Sha256,
            SHA256_NONCE,
            SHA256_SERVER_FIRST,
            SHA256_CLIENT_FINAL,
            SHA256_SERVER_FINAL,
        );
    }

    #[test]
    fn forged_server_signature_fails() {
        let mut c = ScramClient::with_nonce(ScramHash::Sha256, "user", "pencil", SHA256_NONCE);
        c.step(None).unwrap();
        c.step(Some(SHA256_SERVER_FIRST.as_bytes())).unwrap();

        let err = c
            .step(Some(b"v=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="))
            .unwrap_err();
        assert!(err.is_auth());
        assert!(err.to_string().contains("signature mismatch"));
        assert_eq!(c.state(), StepperState::Failed);
        assert!(c.salted_password.is_empty());
        assert!(matches!(
            c.step(Some(b"")),
            Err(SaslError::InvalidState { state: StepperState::Failed, .. })
        ));
    }

    #[test]
    fn server_error_in_final_is_reported() {
        let mut c = ScramClient::with_nonce(ScramHash::Sha1, "user", "pencil", SHA1_NONCE);
        c.step(None).unwrap();
        c.step(Some(SHA1_SERVER_FIRST.as_bytes())).unwrap();
        let err = c.step(Some(b"e=invalid-proof")).unwrap_err();
        assert!(err.to_string().contains("invalid-proof"));
    }

    #[test]
    fn new_clients_get_unique_nonces() {
        let c1 = ScramClient::new(ScramHash::Sha256, "user", "pw");
        let c2 = ScramClient::new(ScramHash::Sha256, "user", "pw");
        assert!(!c1.client_nonce_b64.is_empty());
        assert_ne!(c1.client_nonce_b64, c2.client_nonce_b64);
    }

    #[test]
    fn username_is_escaped_in_client_first() {
        let mut c = ScramClient::with_nonce(ScramHash::Sha1, "user=name,test", "pw", "abc");
        let (first, _) = c.step(None).unwrap();
        assert_eq!(first, b"n,,n=user=3Dname=2Ctest,r=abc");
    }

    #[test]
    fn nonce_that_does_not_extend_ours_fails() {
        for server_first in [
            "r=differentnonce,s=c2FsdA==,i=4096",
            "r=clientnonce,s=c2FsdA==,i=4096",
        ] {
            let mut c = ScramClient::with_nonce(ScramHash::Sha256, "user", "pw", "clientnonce");
            c.step(None).unwrap();
            let err = c.step(Some(server_first.as_bytes())).unwrap_err();
            assert!(err.to_string().contains("nonce mismatch"), "{server_first}: {err}");
        }
    }

    #[test]
    fn sha256_rejects_low_iteration_count() {
        let mut c = ScramClient::with_nonce(ScramHash::Sha256, "user", "pw", "abc");
        c.step(None).unwrap();
        let err = c.step(Some(b"r=abcdef,s=c2FsdA==,i=1000")).unwrap_err();
        assert!(err.to_string().contains("iteration count"));
    }

    #[test]
    fn rejects_excessive_iteration_count() {
        for hash in [ScramHash::Sha1, ScramHash::Sha256] {
            let mut c = ScramClient::with_nonce(hash, "user", "pw", "abc");
            c.step(None).unwrap();
            let err = c.step(Some(b"r=abcdef,s=c2FsdA==,i=4294967295")).unwrap_err();
            assert!(err.is_auth());
            assert!(err.to_string().contains("above maximum"), "{err}");
            assert_eq!(c.state(), StepperState::Failed);
            assert!(c.password.is_empty());
        }
    }

    #[test]
    fn invalid_salt_base64_fails() {
        let mut c = ScramClient::with_nonce(ScramHash::Sha1, "user", "pw", "abc");
        c.step(None).unwrap();
        let err = c.step(Some(b"r=abcdef,s=!!!invalid!!!,i=4096")).unwrap_err();
        assert!(err.to_string().contains("base64"));
    }

    #[test]
    fn missing_challenge_mid_exchange_fails() {
        let mut c = ScramClient::with_nonce(ScramHash::Sha1, "user", "pw", "abc");
        c.step(None).unwrap();
        assert!(c.step(None).unwrap_err().is_auth());
    }

    #[test]
    fn parse_server_first_accepts_any_order_and_extensions() {
        let parsed = parse_server_first("i=1000,s=Zm9v,r=xyz,x=unknown").unwrap();
        assert_eq!(
            parsed,
            ServerFirst { nonce: "xyz".into(), salt_b64: "Zm9v".into(), iterations: 1000 }
        );
    }

    #[test]
    fn parse_server_first_reports_missing_fields() {
        let cases = [
            ("s=c2FsdA==,i=4096", "nonce"),
            ("r=abc,i=4096", "salt"),
            ("r=abc,s=c2FsdA==", "iteration"),
            ("r=abc,s=c2FsdA==,i=notanumber", "iteration"),
            ("m=ext,r=abc,s=c2FsdA==,i=4096", "mandatory extension"),
        ];
        for (input, needle) in cases {
            let err = parse_server_first(input).unwrap_err();
            assert!(err.to_string().contains(needle), "{input}: {err}");
        }
    }

    #[test]
    fn hi_depends_on_iteration_count() {
        let a = ScramHash::Sha256.hi(b"password", b"salt", 4096);
        let b = ScramHash::Sha256.hi(b"password", b"salt", 1000);
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert_eq!(ScramHash::Sha1.hi(b"password", b"salt", 1).len(), 20);
    }

    #[test]
    fn constant_time_eq_compares_length_and_content() {
        assert!(constant_time_eq(&[1, 2, 3], &[1, 2, 3]));
        assert!(constant_time_eq(&[], &[]));
        assert!(!constant_time_eq(&[1, 2, 3], &[1, 2, 4]));
        assert!(!constant_time_eq(&[1, 2, 3], &[1, 2, 3, 4]));
    }
}
