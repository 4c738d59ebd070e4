//! Wire messages of the `turnstile.v1.LimiterService` API.
//!
//! The service stubs are generated by the build script from these types.

/// Ask whether `key` may proceed under a minimum-gap limit.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckRateRequest {
    /// Base limiter key.
    #[prost(string, tag = "1")]
    pub key: ::prost::alloc::string::String,
    /// Scope the key to an authenticated user.
    #[prost(string, optional, tag = "2")]
    pub user_id: ::core::option::Option<::prost::alloc::string::String>,
    /// Scope the key to a trusted client address.
    #[prost(string, optional, tag = "3")]
    pub client_ip: ::core::option::Option<::prost::alloc::string::String>,
    /// Minimum milliseconds between accepted requests; 1000 when unset.
    #[prost(int64, optional, tag = "4")]
    pub rate_ms: ::core::option::Option<i64>,
}

/// Ask whether `key` may proceed under a fixed-window quota.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckQuotaRequest {
    /// Base limiter key.
    #[prost(string, tag = "1")]
    pub key: ::prost::alloc::string::String,
    /// Scope the key to an authenticated user.
    #[prost(string, optional, tag = "2")]
    pub user_id: ::core::option::Option<::prost::alloc::string::String>,
    /// Scope the key to a trusted client address.
    #[prost(string, optional, tag = "3")]
    pub client_ip: ::core::option::Option<::prost::alloc::string::String>,
    /// Requests per window; 1 when unset.
    #[prost(uint64, optional, tag = "4")]
    pub limit: ::core::option::Option<u64>,
    /// Window length in units; 1 when unset.
    #[prost(uint32, optional, tag = "5")]
    pub interval: ::core::option::Option<u32>,
    /// Window unit; "second" when unset.
    #[prost(string, optional, tag = "6")]
    pub interval_unit: ::core::option::Option<::prost::alloc::string::String>,
}

/// The decision for one check.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckResponse {
    #[prost(enumeration = "Code", tag = "1")]
    pub code: i32,
    /// Human-readable status, e.g. "ok".
    #[prost(string, tag = "2")]
    pub status: ::prost::alloc::string::String,
    /// HTTP status a gateway should answer with.
    #[prost(uint32, tag = "3")]
    pub http_status: u32,
    /// JSON body a gateway should answer with.
    #[prost(string, tag = "4")]
    pub body: ::prost::alloc::string::String,
    /// Earliest time a retry could be accepted, for over-limit decisions.
    #[prost(message, optional, tag = "5")]
    pub retry_after: ::core::option::Option<::prost_types::Duration>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Code {
    Unknown = 0,
    Ok = 1,
    OverLimit = 2,
    Invalid = 3,
}

include!(concat!(env!("OUT_DIR"), "/turnstile.v1.LimiterService.rs"));
