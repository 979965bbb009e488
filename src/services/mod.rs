pub mod mpesa_service;
pub mod normalize;
pub mod reconciler;
