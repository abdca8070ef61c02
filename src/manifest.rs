//! Master and variant manifest resolution
//!
//! Fetches a remote master playlist, labels each variant with a quality tier,
//! and expands the chosen variant playlist into an ordered list of absolute
//! segment URLs. Manifests are transient and never persisted.

use crate::config::FailurePolicyConfig;
use crate::error::{ManifestError, Result};
use crate::types::Tier;
use m3u8_rs::Playlist;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// One playable rendition offered by a master manifest
#[derive(Clone, Debug)]
pub struct Variant {
    /// Quality tier label derived from the advertised resolution or bandwidth
    pub tier: Tier,
    /// Advertised bandwidth in bits per second
    pub bandwidth: u64,
    /// Absolute URL of the variant's media playlist
    pub uri: Url,
}

/// A resolved master manifest: best variant per tier, highest quality first
#[derive(Clone, Debug)]
pub struct MasterManifest {
    /// URL the master playlist was fetched from
    pub master_uri: Url,
    /// One entry per distinct tier, ordered `fhd` down to `ld`
    pub variants: Vec<Variant>,
}

impl MasterManifest {
    /// Tiers offered by this manifest, highest quality first
    pub fn available_tiers(&self) -> Vec<Tier> {
        self.variants.iter().map(|v| v.tier).collect()
    }

    /// Variant for an already-resolved concrete tier
    pub fn variant_for(&self, tier: Tier) -> Option<&Variant> {
        self.variants.iter().find(|v| v.tier == tier)
    }
}

/// Label a variant's tier from its advertised RESOLUTION height
fn tier_from_height(height: u64) -> Tier {
    match height {
        h if h >= 1080 => Tier::Fhd,
        h if h >= 720 => Tier::Hd,
        h if h >= 480 => Tier::Sd,
        _ => Tier::Ld,
    }
}

/// Fallback labelling for variants that omit RESOLUTION
fn tier_from_bandwidth(bandwidth: u64) -> Tier {
    match bandwidth {
        b if b >= 5_000_000 => Tier::Fhd,
        b if b >= 2_500_000 => Tier::Hd,
        b if b >= 1_000_000 => Tier::Sd,
        _ => Tier::Ld,
    }
}

/// Fetches and parses HLS playlists over a shared HTTP client
///
/// The client carries the session's default headers; this resolver only adds
/// the per-request manifest timeout.
pub struct ManifestResolver {
    client: Client,
    timeout: Duration,
}

impl ManifestResolver {
    /// Create a resolver using the given client and failure-policy timeouts
    pub fn new(client: Client, policy: &FailurePolicyConfig) -> Self {
        Self {
            client,
            timeout: policy.manifest_timeout,
        }
    }

    /// Cheap HEAD pre-check of the master manifest URL
    ///
    /// Confirms the source answers successfully and, when a content type is
    /// advertised, that it plausibly denotes a playlist rather than an error
    /// page. Runs once per item before any segment work starts.
    pub async fn validate_source(&self, url: &Url) -> Result<()> {
        let response = self
            .client
            .head(url.clone())
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ManifestError::MasterUnavailable {
                uri: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        if let Some(content_type) = response.headers().get(reqwest::header::CONTENT_TYPE)
            && let Ok(content_type) = content_type.to_str()
            && !looks_like_playlist(content_type)
        {
            return Err(ManifestError::ParseFailed {
                uri: url.to_string(),
                reason: format!("unexpected content type {content_type}"),
            }
            .into());
        }

        Ok(())
    }

    /// Fetch and resolve a master playlist into tier-labelled variants
    ///
    /// Variants sharing a tier label collapse to the highest-bandwidth one.
    /// A playlist with no variants (including a media playlist where a master
    /// was expected) is a hard `NoVariants` error.
    pub async fn resolve_master(&self, url: &Url) -> Result<MasterManifest> {
        let body = self.fetch_playlist(url).await?;
        let playlist = parse(url, &body)?;

        let master = match playlist {
            Playlist::MasterPlaylist(master) => master,
            Playlist::MediaPlaylist(_) => {
                return Err(ManifestError::NoVariants {
                    uri: url.to_string(),
                }
                .into());
            }
        };

        let mut by_tier: Vec<Variant> = Vec::new();
        for stream in &master.variants {
            if stream.is_i_frame {
                continue;
            }
            let tier = match stream.resolution {
                Some(res) => tier_from_height(res.height),
                None => tier_from_bandwidth(stream.bandwidth),
            };
            let uri = join(url, &stream.uri)?;
            match by_tier.iter_mut().find(|v| v.tier == tier) {
                Some(existing) if existing.bandwidth >= stream.bandwidth => {}
                Some(existing) => {
                    existing.bandwidth = stream.bandwidth;
                    existing.uri = uri;
                }
                None => by_tier.push(Variant {
                    tier,
                    bandwidth: stream.bandwidth,
                    uri,
                }),
            }
        }

        if by_tier.is_empty() {
            return Err(ManifestError::NoVariants {
                uri: url.to_string(),
            }
            .into());
        }

        // Highest quality first: fhd, hd, sd, ld
        by_tier.sort_by_key(|v| match v.tier {
            Tier::Best | Tier::Fhd => 0,
            Tier::Hd => 1,
            Tier::Sd => 2,
            Tier::Ld => 3,
        });

        tracing::debug!(
            master = %url,
            tiers = ?by_tier.iter().map(|v| v.tier).collect::<Vec<_>>(),
            "Resolved master manifest"
        );

        Ok(MasterManifest {
            master_uri: url.clone(),
            variants: by_tier,
        })
    }

    /// Fetch a variant's media playlist and expand it to absolute segment URLs
    ///
    /// Segment order follows playlist order. An empty segment list is a hard
    /// `NoSegments` error, distinct from a master with no variants.
    pub async fn resolve_variant(&self, variant: &Variant) -> Result<Vec<Url>> {
        let body = self.fetch_playlist(&variant.uri).await?;
        let playlist = parse(&variant.uri, &body)?;

        let media = match playlist {
            Playlist::MediaPlaylist(media) => media,
            Playlist::MasterPlaylist(_) => {
                return Err(ManifestError::ParseFailed {
                    uri: variant.uri.to_string(),
                    reason: "expected a media playlist, got a master playlist".to_string(),
                }
                .into());
            }
        };

        let mut segments = Vec::with_capacity(media.segments.len());
        for segment in &media.segments {
            segments.push(join(&variant.uri, &segment.uri)?);
        }

        if segments.is_empty() {
            return Err(ManifestError::NoSegments {
                uri: variant.uri.to_string(),
            }
            .into());
        }

        Ok(segments)
    }

    async fn fetch_playlist(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ManifestError::MasterUnavailable {
                uri: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        Ok(response.bytes().await?.to_vec())
    }
}

fn parse(url: &Url, body: &[u8]) -> Result<Playlist> {
    m3u8_rs::parse_playlist_res(body).map_err(|e| {
        ManifestError::ParseFailed {
            uri: url.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Accept the content types CDNs actually use for playlists; an absent
/// header is treated as acceptable
fn looks_like_playlist(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("mpegurl") || ct.contains("octet-stream") || ct.contains("text/plain")
}

/// Join a possibly-relative playlist URI against its enclosing playlist's URL
fn join(base: &Url, raw: &str) -> Result<Url> {
    base.join(raw).map_err(|e| {
        ManifestError::InvalidUri {
            uri: raw.to_string(),
            base: base.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
