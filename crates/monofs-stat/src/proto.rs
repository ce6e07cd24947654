//! Request/response shapes of the stat service.

use serde::{Deserialize, Serialize};

// Method ids carried in the wire frame.
pub const METHOD_STAT: u16 = 1;
pub const METHOD_CREATE_SNAPSHOT: u16 = 2;
pub const METHOD_LIST_SNAPSHOTS: u16 = 3;
pub const METHOD_DELETE_SNAPSHOT: u16 = 4;
pub const METHOD_GET_SNAPSHOT: u16 = 5;
/// Response-only method id carrying an error string payload.
pub const METHOD_ERROR: u16 = 0xFFFF;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRequest {
    /// Filesystem name the caller asks about.
    pub fs: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatResponse {
    pub id: String,
    pub block_size: u32,
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
}

// Snapshot management shapes. Visible interface; integration into the
// core is deferred.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub name: String,
    pub created_at_ns: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSnapshotRequest {
    pub fs: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSnapshotsRequest {
    pub fs: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSnapshotsResponse {
    pub snapshots: Vec<SnapshotInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSnapshotRequest {
    pub fs: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSnapshotRequest {
    pub fs: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSnapshotResponse {
    pub snapshot: Option<SnapshotInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_shapes_roundtrip() {
        let req = StatRequest { fs: "monofs".into() };
        let parsed: StatRequest =
            serde_json::from_slice(&serde_json::to_vec(&req).unwrap()).unwrap();
        assert_eq!(parsed, req);

        let rsp = StatResponse {
            id: "monofs".into(),
            block_size: 4096,
            blocks: 1 << 20,
            blocks_free: 1 << 19,
            blocks_available: 1 << 20,
        };
        let parsed: StatResponse =
            serde_json::from_slice(&serde_json::to_vec(&rsp).unwrap()).unwrap();
        assert_eq!(parsed, rsp);
    }

    #[test]
    fn test_snapshot_shapes_roundtrip() {
        let rsp = ListSnapshotsResponse {
            snapshots: vec![SnapshotInfo {
                name: "head".into(),
                created_at_ns: 42,
            }],
        };
        let parsed: ListSnapshotsResponse =
            serde_json::from_slice(&serde_json::to_vec(&rsp).unwrap()).unwrap();
        assert_eq!(parsed, rsp);
    }
}
