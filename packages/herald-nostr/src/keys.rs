//! Secret key parsing and BIP-340 signing.

use std::{fmt, str::FromStr, sync::LazyLock};

use bech32::{Bech32, Hrp};
use rand::RngCore;
use secp256k1::{All, Keypair, Message, Secp256k1, SecretKey, XOnlyPublicKey, schnorr::Signature};

use crate::{
	Error, Result,
	event::{self, Event, EventTemplate},
};

const NSEC_HRP: &str = "nsec";
const NPUB_HRP: &str = "npub";

static SECP: LazyLock<Secp256k1<All>> = LazyLock::new(Secp256k1::new);

/// A signing identity. The public key is the hex encoded x-only key used as the event author.
#[derive(Clone)]
pub struct Keys {
	keypair: Keypair,
	public_key: String,
}
impl Keys {
	/// Accepts a 64 character hex secret or a bech32 `nsec1...` string.
	pub fn parse(raw: &str) -> Result<Self> {
		let raw = raw.trim();

		if raw.to_ascii_lowercase().starts_with("nsec1") {
			let (hrp, data) = bech32::decode(raw)
				.map_err(|err| Error::InvalidKey(format!("bech32 decode failed: {err}.")))?;

			if hrp.to_lowercase() != NSEC_HRP {
				return Err(Error::InvalidKey(format!("unexpected prefix {:?}.", hrp.as_str())));
			}

			return Self::from_secret_bytes(&data);
		}
		if raw.len() != 64 {
			return Err(Error::InvalidKey(
				"expected 64 hex characters or an nsec string.".to_string(),
			));
		}

		let bytes = hex::decode(raw)
			.map_err(|err| Error::InvalidKey(format!("hex decode failed: {err}.")))?;

		Self::from_secret_bytes(&bytes)
	}

	pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
		let secret = SecretKey::from_slice(bytes)
			.map_err(|err| Error::InvalidKey(format!("not a valid secp256k1 scalar: {err}.")))?;
		let keypair = Keypair::from_secret_key(&SECP, &secret);
		let (xonly, _) = keypair.x_only_public_key();

		Ok(Self { keypair, public_key: hex::encode(xonly.serialize()) })
	}

	pub fn generate() -> Self {
		let mut rng = rand::thread_rng();

		loop {
			let mut bytes = [0_u8; 32];

			rng.fill_bytes(&mut bytes);

			if let Ok(keys) = Self::from_secret_bytes(&bytes) {
				return keys;
			}
		}
	}

	pub fn public_key(&self) -> &str {
		&self.public_key
	}

	pub fn to_nsec(&self) -> Result<String> {
		let hrp = Hrp::parse(NSEC_HRP)
			.map_err(|err| Error::InvalidKey(format!("invalid prefix: {err}.")))?;

		bech32::encode::<Bech32>(hrp, &self.keypair.secret_bytes())
			.map_err(|err| Error::InvalidKey(format!("bech32 encode failed: {err}.")))
	}

	/// Attaches this identity as author, computes the id and signs it deterministically.
	pub fn sign(&self, template: EventTemplate) -> Result<Event> {
		let EventTemplate { created_at, kind, tags, content } = template;
		let id = event::compute_id(&self.public_key, created_at, kind, &tags, &content)?;
		let sig = SECP.sign_schnorr_no_aux_rand(&Message::from_digest(id), &self.keypair);

		Ok(Event {
			id: hex::encode(id),
			pubkey: self.public_key.clone(),
			created_at,
			kind,
			tags,
			content,
			sig: sig.to_string(),
		})
	}
}
impl fmt::Debug for Keys {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Keys").field("public_key", &self.public_key).finish_non_exhaustive()
	}
}

/// Bech32 `npub1...` form of a hex encoded x-only public key.
pub fn npub(public_key: &str) -> Result<String> {
	let bytes = hex::decode(public_key)
		.map_err(|err| Error::InvalidKey(format!("hex decode failed: {err}.")))?;

	if bytes.len() != 32 {
		return Err(Error::InvalidKey("public keys are 32 bytes.".to_string()));
	}

	let hrp =
		Hrp::parse(NPUB_HRP).map_err(|err| Error::InvalidKey(format!("invalid prefix: {err}.")))?;

	bech32::encode::<Bech32>(hrp, &bytes)
		.map_err(|err| Error::InvalidKey(format!("bech32 encode failed: {err}.")))
}

/// Recomputes the id from the event body and checks the signature against its author.
pub fn verify(event: &Event) -> Result<()> {
	let id = event::compute_id(
		&event.pubkey,
		event.created_at,
		event.kind,
		&event.tags,
		&event.content,
	)?;

	if hex::encode(id) != event.id {
		return Err(Error::InvalidEvent("id does not match the event body.".to_string()));
	}

	let author = XOnlyPublicKey::from_str(&event.pubkey)
		.map_err(|err| Error::InvalidEvent(format!("invalid pubkey: {err}.")))?;
	let sig = Signature::from_str(&event.sig)
		.map_err(|err| Error::InvalidEvent(format!("invalid signature encoding: {err}.")))?;

	SECP.verify_schnorr(&sig, &Message::from_digest(id), &author)
		.map_err(|err| Error::InvalidEvent(format!("signature check failed: {err}.")))
}
