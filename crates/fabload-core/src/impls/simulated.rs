//! SimulatedTransport - a fake ledger for exercising the harness without a
//! network.
//!
//! Latency is random within a range. Failures are drawn per call from the
//! configured rates. Endorsement signatures are a keyed checksum of the
//! payload, so the transport can verify what it produced.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::domain::{Endorsement, QueryResponse, TxResponse, ValidationCode};
use crate::ports::{CallRequest, LedgerTransport, SignatureVerifier, TransportError};

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationProfile {
    pub latency_ms: Range<u64>,
    /// Share of calls committed with a retry-eligible code.
    pub transient_rate: f64,
    /// Share of calls committed with a terminal code.
    pub persistent_rate: f64,
    /// Share of calls that never get a response.
    pub transport_rate: f64,
    pub endorsers: Vec<String>,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            latency_ms: 5..50,
            transient_rate: 0.05,
            persistent_rate: 0.01,
            transport_rate: 0.01,
            endorsers: vec!["peer0".to_string(), "peer1".to_string()],
        }
    }
}

/// What one simulated call turns into, decided before any await.
enum Draw {
    Lost,
    Commit(ValidationCode),
}

pub struct SimulatedTransport {
    profile: SimulationProfile,
    tx_seq: AtomicU64,
}

impl SimulatedTransport {
    pub fn new(profile: SimulationProfile) -> Self {
        Self {
            profile,
            tx_seq: AtomicU64::new(0),
        }
    }

    pub fn profile(&self) -> &SimulationProfile {
        &self.profile
    }

    fn draw(&self) -> (Duration, Draw) {
        let mut rng = rand::thread_rng();
        let latency = if self.profile.latency_ms.is_empty() {
            self.profile.latency_ms.start
        } else {
            rng.gen_range(self.profile.latency_ms.clone())
        };

        let roll: f64 = rng.gen_range(0.0..1.0);
        let p = &self.profile;
        let draw = if roll < p.transport_rate {
            Draw::Lost
        } else if roll < p.transport_rate + p.transient_rate {
            Draw::Commit(ValidationCode::MvccReadConflict)
        } else if roll < p.transport_rate + p.transient_rate + p.persistent_rate {
            Draw::Commit(ValidationCode::EndorsementPolicyFailure)
        } else {
            Draw::Commit(ValidationCode::Valid)
        };
        (Duration::from_millis(latency), draw)
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new(SimulationProfile::default())
    }
}

#[async_trait]
impl LedgerTransport for SimulatedTransport {
    async fn submit(&self, request: &CallRequest) -> Result<TxResponse, TransportError> {
        let (latency, draw) = self.draw();
        tokio::time::sleep(latency).await;

        match draw {
            Draw::Lost => Err(TransportError::NoResponse(format!(
                "simulated timeout for {}",
                request.function
            ))),
            Draw::Commit(code) => {
                let n = self.tx_seq.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(TxResponse::new(format!("sim-{n:08}"), code))
            }
        }
    }

    async fn query(&self, request: &CallRequest) -> Result<QueryResponse, TransportError> {
        let (latency, draw) = self.draw();
        tokio::time::sleep(latency).await;

        let payload = format!("{}({})", request.function, request.args.join(",")).into_bytes();
        let mut endorsements: Vec<Endorsement> = self
            .profile
            .endorsers
            .iter()
            .map(|name| Endorsement {
                endorser: name.clone(),
                status: 200,
                signature: sign(name, &payload),
                payload: payload.clone(),
            })
            .collect();

        match draw {
            Draw::Lost => {
                return Err(TransportError::NoResponse(format!(
                    "simulated timeout for {}",
                    request.function
                )));
            }
            Draw::Commit(code) if !code.is_valid() => {
                // one endorser disagrees
                if let Some(last) = endorsements.last_mut() {
                    last.status = 500;
                }
            }
            Draw::Commit(_) => {}
        }
        Ok(QueryResponse {
            payload,
            endorsements,
        })
    }
}

impl SignatureVerifier for SimulatedTransport {
    fn verify(&self, endorsement: &Endorsement) -> bool {
        endorsement.signature == sign(&endorsement.endorser, &endorsement.payload)
    }
}

/// FNV-1a over the endorser name and the payload.
fn sign(endorser: &str, payload: &[u8]) -> Vec<u8> {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let hash = endorser
        .as_bytes()
        .iter()
        .chain(payload)
        .fold(OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(PRIME));
    format!("{endorser}:{hash:016x}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;
    use ulid::Ulid;

    fn quiet() -> SimulationProfile {
        SimulationProfile {
            latency_ms: 0..1,
            transient_rate: 0.0,
            persistent_rate: 0.0,
            transport_rate: 0.0,
            ..SimulationProfile::default()
        }
    }

    fn request() -> CallRequest {
        CallRequest {
            task_id: TaskId::from_ulid(Ulid::new()),
            function: "get".into(),
            args: vec!["k".into()],
            targets: Vec::new(),
        }
    }

    #[tokio::test]
    async fn quiet_profile_always_commits() {
        let transport = SimulatedTransport::new(quiet());
        for _ in 0..20 {
            let resp = transport.submit(&request()).await.unwrap();
            assert!(resp.validation_code.is_valid());
        }
    }

    #[tokio::test]
    async fn query_signatures_verify() {
        let transport = SimulatedTransport::new(quiet());
        let resp = transport.query(&request()).await.unwrap();

        assert_eq!(resp.payload, b"get(k)".to_vec());
        assert_eq!(resp.endorsements.len(), 2);
        assert!(resp.endorsements.iter().all(|e| transport.verify(e)));
    }

    #[tokio::test]
    async fn tampered_payload_fails_verification() {
        let transport = SimulatedTransport::new(quiet());
        let mut resp = transport.query(&request()).await.unwrap();
        resp.endorsements[0].payload = b"other".to_vec();

        assert!(!transport.verify(&resp.endorsements[0]));
    }

    #[tokio::test]
    async fn certain_failure_rates_are_honored() {
        let lost = SimulatedTransport::new(SimulationProfile {
            transport_rate: 1.0,
            ..quiet()
        });
        assert!(lost.submit(&request()).await.is_err());

        let conflicted = SimulatedTransport::new(SimulationProfile {
            transient_rate: 1.0,
            ..quiet()
        });
        let resp = conflicted.submit(&request()).await.unwrap();
        assert!(resp.validation_code.is_transient());
    }
}
