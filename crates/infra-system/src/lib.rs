// Opsync Infrastructure - System Adapters
// Implements: ResourceProbe (sysinfo-backed readings) and the HTTP
// sync transport

mod http_executor;
mod resource_probe_impl;

pub use http_executor::HttpSyncExecutor;
pub use resource_probe_impl::SysinfoResourceProbe;
