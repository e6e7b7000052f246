//! Raw verbs FFI surface.
//!
//! Under `--features hardware` this includes bindgen-generated bindings for
//! `infiniband/verbs.h`. Otherwise it provides hand-written stand-ins for the
//! handful of types/constants the rest of this crate names, so the crate
//! builds and its unit tests run on machines without RDMA hardware or
//! `libibverbs-dev` installed.

#[cfg(feature = "hardware")]
#[allow(non_upper_case_globals, non_camel_case_types, non_snake_case, dead_code)]
mod generated {
    include!(concat!(env!("OUT_DIR"), "/rdma_bindings.rs"));
}

#[cfg(feature = "hardware")]
pub use generated::*;

#[cfg(not(feature = "hardware"))]
#[allow(non_camel_case_types, dead_code)]
mod stub {
    pub type ibv_device = std::ffi::c_void;
    pub type ibv_context = std::ffi::c_void;
    pub type ibv_pd = std::ffi::c_void;
    pub type ibv_mr = std::ffi::c_void;
    pub type ibv_cq = std::ffi::c_void;
    pub type ibv_qp = std::ffi::c_void;
    pub type ibv_device_attr = std::ffi::c_void;
    pub type ibv_port_attr = std::ffi::c_void;
    pub type ibv_gid = std::ffi::c_void;
    pub type ibv_qp_init_attr = std::ffi::c_void;
    pub type ibv_qp_attr = std::ffi::c_void;
    pub type ibv_send_wr = std::ffi::c_void;
    pub type ibv_sge = std::ffi::c_void;
    pub type ibv_wc = std::ffi::c_void;

    pub const IBV_ACCESS_LOCAL_WRITE: u32 = 1;
    pub const IBV_ACCESS_REMOTE_WRITE: u32 = 2;
    pub const IBV_ACCESS_REMOTE_READ: u32 = 4;

    #[repr(u32)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ibv_wc_status {
        IBV_WC_SUCCESS = 0,
        IBV_WC_WR_FLUSH_ERR = 5,
        IBV_WC_RETRY_EXC_ERR = 12,
    }
}

#[cfg(not(feature = "hardware"))]
pub use stub::*;
