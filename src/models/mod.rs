pub mod device;
pub mod visit;

pub use device::{platform_from_user_agent, DeviceInfo, UNKNOWN_PLATFORM};
pub use visit::{
    NewVisit, RecordVisitRequest, RecordVisitResponse, VisitEvent, VisitId, VisitRecord,
    VisitorIdentity, UNKNOWN_MARKET,
};
