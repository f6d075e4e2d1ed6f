//! # aegis-async-grants
//!
//! Out-of-band authorization grants that replace the browser redirect
//! with polling or a backchannel callback (`spec.md` §4.L, §4.M):
//! [`device`] implements the RFC 8628 Device Authorization Grant and
//! [`ciba`] implements Client-Initiated Backchannel Authentication.
//! Both share [`poll_governor::PollGovernor`] for the `slow_down`
//! interval-enforcement rule the two grants have in common.

pub mod ciba;
pub mod device;
pub mod poll_governor;

pub use ciba::{
    CIBAEngine, CibaAuthorization, CibaPollOutcome, CibaTokens, DeliveryMode, DeliveryOutcome,
    NotificationSink, ReqwestNotificationSink,
};
pub use device::{DeviceAuthorization, DeviceFlow, DevicePollOutcome, DeviceTokens};
pub use poll_governor::{PollDecision, PollGovernor, SLOW_DOWN_INCREMENT_SECONDS};
