use uuid::Uuid;

/// Assigns a unique id to each accepted request (spec.md §3 "Request
/// record"). UUIDv7 so ids sort with arrival order, which makes access log
/// grepping and request correlation friendlier than v4 would be.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdGenerator;

impl IdGenerator {
    #[must_use]
    pub fn next(&self) -> RequestId {
        RequestId(Uuid::now_v7())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub struct RequestId(Uuid);

impl RequestId {
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}
