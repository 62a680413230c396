//! Binary snapshot of the dynamic scene state.
//!
//! A snapshot is what a host needs to rebuild a session: the two cannon
//! orientations and the kinematic state of every crate.
//!
//! ## Binary Layout
//!
//! All fields little-endian.
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | Host cannon orientation (`f32`) |
//! | 4 | 4 | Client cannon orientation (`f32`) |
//! | 8 | 4 | Crate count N (`u32`) |
//! | 12 | N×24 | Crate records: x, y, angle, vx, vy, angvel (6 × `f32`) |
//!
//! Decoding is pure: it reads only the caller's buffer.

use std::path::Path;

use tracing::{debug, info};

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 12;

/// Size of one crate record in bytes.
pub const RECORD_LEN: usize = 24;

/// Kinematic state of one crate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CrateRecord {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub vx: f32,
    pub vy: f32,
    pub angvel: f32,
}

impl CrateRecord {
    fn fields(&self) -> [f32; 6] {
        [self.x, self.y, self.angle, self.vx, self.vy, self.angvel]
    }

    fn from_fields(f: [f32; 6]) -> Self {
        Self {
            x: f[0],
            y: f[1],
            angle: f[2],
            vx: f[3],
            vy: f[4],
            angvel: f[5],
        }
    }

    /// Bitwise equality, so `-0.0 != 0.0` and NaN payloads are compared.
    pub fn bits_eq(&self, other: &Self) -> bool {
        self.fields()
            .iter()
            .zip(other.fields().iter())
            .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

/// Dynamic state of a whole scene.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimulationSnapshot {
    /// Cannon orientations: host first, then client.
    pub orientations: [f32; 2],
    pub crates: Vec<CrateRecord>,
}

/// Errors that can occur while decoding or persisting a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The buffer is shorter than the header or the declared crate count implies.
    #[error("snapshot truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    /// The declared crate count cannot be represented on this platform.
    #[error("crate count {0} overflows buffer size")]
    CountOverflow(u32),
    /// Bytes remain after the last declared record.
    #[error("{0} trailing bytes after last crate record")]
    TrailingBytes(usize),
    /// More crates than the header can describe.
    #[error("too many crates to encode: {0}")]
    TooManyCrates(usize),
    #[error("snapshot file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl SimulationSnapshot {
    /// Encodes the snapshot into its fixed binary layout.
    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        let count = u32::try_from(self.crates.len())
            .map_err(|_| SnapshotError::TooManyCrates(self.crates.len()))?;

        let mut buf = Vec::with_capacity(HEADER_LEN + self.crates.len() * RECORD_LEN);
        for o in self.orientations {
            buf.extend_from_slice(&o.to_le_bytes());
        }
        buf.extend_from_slice(&count.to_le_bytes());
        for record in &self.crates {
            for field in record.fields() {
                buf.extend_from_slice(&field.to_le_bytes());
            }
        }
        Ok(buf)
    }

    /// Decodes a snapshot, refusing to read past the end of `data`.
    pub fn decode(data: &[u8]) -> Result<Self, SnapshotError> {
        if data.len() < HEADER_LEN {
            return Err(SnapshotError::Truncated {
                expected: HEADER_LEN,
                actual: data.len(),
            });
        }

        let orientations = [read_f32(data, 0), read_f32(data, 4)];
        let count = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);

        let expected = usize::try_from(count)
            .ok()
            .and_then(|n| n.checked_mul(RECORD_LEN))
            .and_then(|body| body.checked_add(HEADER_LEN))
            .ok_or(SnapshotError::CountOverflow(count))?;
        if data.len() < expected {
            return Err(SnapshotError::Truncated {
                expected,
                actual: data.len(),
            });
        }
        if data.len() > expected {
            return Err(SnapshotError::TrailingBytes(data.len() - expected));
        }

        let crates = data[HEADER_LEN..]
            .chunks_exact(RECORD_LEN)
            .map(|rec| {
                let mut fields = [0.0f32; 6];
                for (i, field) in fields.iter_mut().enumerate() {
                    *field = read_f32(rec, i * 4);
                }
                CrateRecord::from_fields(fields)
            })
            .collect();

        Ok(Self {
            orientations,
            crates,
        })
    }

    /// Bitwise equality over every scalar.
    pub fn bits_eq(&self, other: &Self) -> bool {
        self.orientations
            .iter()
            .zip(other.orientations.iter())
            .all(|(a, b)| a.to_bits() == b.to_bits())
            && self.crates.len() == other.crates.len()
            && self
                .crates
                .iter()
                .zip(other.crates.iter())
                .all(|(a, b)| a.bits_eq(b))
    }
}

fn read_f32(data: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Writes an encoded snapshot to `path`.
pub fn write_snapshot(path: &Path, snapshot: &SimulationSnapshot) -> Result<(), SnapshotError> {
    let bytes = snapshot.encode()?;
    std::fs::write(path, &bytes)?;
    info!(path = %path.display(), crates = snapshot.crates.len(), "snapshot written");
    Ok(())
}

/// Reads and decodes a snapshot from `path`.
pub fn load_snapshot(path: &Path) -> Result<SimulationSnapshot, SnapshotError> {
    let bytes = std::fs::read(path)?;
    let snapshot = SimulationSnapshot::decode(&bytes)?;
    debug!(path = %path.display(), crates = snapshot.crates.len(), "snapshot loaded");
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn two_crates() -> SimulationSnapshot {
        SimulationSnapshot {
            orientations: [0.0, 3.14159],
            crates: vec![
                CrateRecord {
                    x: 1.0,
                    y: 2.0,
                    angle: 0.0,
                    vx: 0.0,
                    vy: 0.0,
                    angvel: 0.0,
                },
                CrateRecord {
                    x: 3.5,
                    y: -1.25,
                    angle: 1.57,
                    vx: 2.0,
                    vy: 0.0,
                    angvel: 0.1,
                },
            ],
        }
    }

    #[test]
    fn test_two_crate_scenario() {
        let snap = two_crates();
        let bytes = snap.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 2 * RECORD_LEN);

        let decoded = SimulationSnapshot::decode(&bytes).unwrap();
        assert_eq!(decoded.crates.len(), 2);
        assert_eq!(decoded.orientations[0].to_bits(), 0.0f32.to_bits());
        assert_eq!(decoded.orientations[1].to_bits(), 3.14159f32.to_bits());
        assert_eq!(decoded.crates[0].x, 1.0);
        assert_eq!(decoded.crates[1].y, -1.25);
        assert_eq!(decoded.crates[1].angle.to_bits(), 1.57f32.to_bits());
        assert_eq!(decoded.crates[1].angvel.to_bits(), 0.1f32.to_bits());
        assert!(decoded.bits_eq(&snap));
    }

    #[test]
    fn test_field_order_on_wire() {
        let bytes = two_crates().encode().unwrap();
        assert_eq!(&bytes[4..8], &3.14159f32.to_le_bytes());
        assert_eq!(&bytes[8..12], &2u32.to_le_bytes());
        // second record starts after the first; its x is 3.5
        let second = HEADER_LEN + RECORD_LEN;
        assert_eq!(&bytes[second..second + 4], &3.5f32.to_le_bytes());
        assert_eq!(&bytes[second + 12..second + 16], &2.0f32.to_le_bytes());
    }

    #[test]
    fn test_signed_zero_and_nan_survive() {
        let snap = SimulationSnapshot {
            orientations: [-0.0, f32::from_bits(0x7fc0_1234)],
            crates: vec![],
        };
        let decoded = SimulationSnapshot::decode(&snap.encode().unwrap()).unwrap();
        assert!(decoded.bits_eq(&snap));
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = SimulationSnapshot::default();
        let bytes = snap.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert!(SimulationSnapshot::decode(&bytes).unwrap().crates.is_empty());
    }

    #[test]
    fn test_short_header_rejected() {
        assert!(matches!(
            SimulationSnapshot::decode(&[0u8; 11]),
            Err(SnapshotError::Truncated {
                expected: 12,
                actual: 11
            })
        ));
    }

    #[test]
    fn test_declared_count_exceeds_buffer() {
        let mut bytes = two_crates().encode().unwrap();
        bytes[8..12].copy_from_slice(&3u32.to_le_bytes());
        assert!(matches!(
            SimulationSnapshot::decode(&bytes),
            Err(SnapshotError::Truncated { expected, actual })
                if expected == HEADER_LEN + 3 * RECORD_LEN && actual == HEADER_LEN + 2 * RECORD_LEN
        ));
    }

    #[test]
    fn test_huge_count_does_not_allocate() {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(SimulationSnapshot::decode(&bytes).is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = two_crates().encode().unwrap();
        bytes.push(0);
        assert!(matches!(
            SimulationSnapshot::decode(&bytes),
            Err(SnapshotError::TrailingBytes(1))
        ));
    }

    fn record_strategy() -> impl Strategy<Value = CrateRecord> {
        prop::array::uniform6(any::<u32>())
            .prop_map(|bits| CrateRecord::from_fields(bits.map(f32::from_bits)))
    }

    fn snapshot_strategy() -> impl Strategy<Value = SimulationSnapshot> {
        (
            prop::array::uniform2(any::<u32>()),
            prop::collection::vec(record_strategy(), 0..64),
        )
            .prop_map(|(orientations, crates)| SimulationSnapshot {
                orientations: orientations.map(f32::from_bits),
                crates,
            })
    }

    proptest! {
        #[test]
        fn prop_roundtrip_is_bit_exact(snap in snapshot_strategy()) {
            let bytes = snap.encode().unwrap();
            prop_assert_eq!(bytes.len(), HEADER_LEN + snap.crates.len() * RECORD_LEN);
            let decoded = SimulationSnapshot::decode(&bytes).unwrap();
            prop_assert_eq!(decoded.crates.len(), snap.crates.len());
            prop_assert!(decoded.bits_eq(&snap));
        }

        #[test]
        fn prop_any_truncation_is_rejected(
            snap in snapshot_strategy(),
            cut in any::<prop::sample::Index>(),
        ) {
            let bytes = snap.encode().unwrap();
            let len = cut.index(bytes.len());
            let is_truncated = matches!(
                SimulationSnapshot::decode(&bytes[..len]),
                Err(SnapshotError::Truncated { .. })
            );
            prop_assert!(is_truncated);
        }
    }

    #[test]
    fn test_file_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.snap");
        write_snapshot(&path, &two_crates()).unwrap();
        let loaded = load_snapshot(&path).unwrap();
        assert!(loaded.bits_eq(&two_crates()));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_snapshot(&dir.path().join("nope.snap")),
            Err(SnapshotError::Io(_))
        ));
    }
}
