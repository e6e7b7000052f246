//! RDMA device discovery, protection domain, and memory registration.

use crate::errors::FabricError;
use log::{debug, info};
use std::sync::Arc;

#[cfg(feature = "hardware")]
use crate::ffi::*;
#[cfg(feature = "hardware")]
use std::ffi::CStr;
#[cfg(feature = "hardware")]
use std::ptr;

/// An opened RDMA device with its protection domain.
///
/// Closing the device (dropping the last `Arc`) deallocates the PD and
/// closes the device context; this must happen after every QP and MR that
/// references it has been torn down.
pub struct RdmaDevice {
    #[cfg(feature = "hardware")]
    context: *mut ibv_context,
    #[cfg(feature = "hardware")]
    pd: *mut ibv_pd,
    device_name: String,
}

unsafe impl Send for RdmaDevice {}
unsafe impl Sync for RdmaDevice {}

impl RdmaDevice {
    /// Open an RDMA device by name (e.g. `"mlx5_0"`, `"rxe0"`).
    #[cfg(feature = "hardware")]
    pub fn open(device_name: &str) -> Result<Arc<Self>, FabricError> {
        info!("opening RDMA device: {device_name}");

        let mut num_devices = 0i32;
        let device_list = unsafe { ibv_get_device_list(&mut num_devices) };
        if device_list.is_null() {
            return Err(FabricError::DeviceNotFound(device_name.to_string()));
        }

        let mut target: *mut ibv_device = ptr::null_mut();
        for i in 0..num_devices {
            let device = unsafe { *device_list.offset(i as isize) };
            let name = unsafe {
                CStr::from_ptr(ibv_get_device_name(device))
                    .to_string_lossy()
                    .into_owned()
            };
            debug!("found RDMA device: {name}");
            if name == device_name {
                target = device;
                break;
            }
        }

        if target.is_null() {
            unsafe { ibv_free_device_list(device_list) };
            return Err(FabricError::DeviceNotFound(device_name.to_string()));
        }

        let context = unsafe { ibv_open_device(target) };
        unsafe { ibv_free_device_list(device_list) };
        if context.is_null() {
            return Err(FabricError::DeviceOpenFailed(device_name.to_string()));
        }

        let pd = unsafe { ibv_alloc_pd(context) };
        if pd.is_null() {
            unsafe { ibv_close_device(context) };
            return Err(FabricError::PdAllocFailed);
        }

        info!("opened RDMA device {device_name} with protection domain");
        Ok(Arc::new(Self {
            context,
            pd,
            device_name: device_name.to_string(),
        }))
    }

    #[cfg(not(feature = "hardware"))]
    pub fn open(_device_name: &str) -> Result<Arc<Self>, FabricError> {
        Err(FabricError::NotAvailable)
    }

    pub fn name(&self) -> &str {
        &self.device_name
    }

    #[cfg(feature = "hardware")]
    pub fn query_attributes(&self) -> Result<DeviceAttributes, FabricError> {
        let mut attr: ibv_device_attr = unsafe { std::mem::zeroed() };
        let ret = unsafe { ibv_query_device(self.context, &mut attr) };
        if ret != 0 {
            return Err(FabricError::DeviceOpenFailed(self.device_name.clone()));
        }
        Ok(DeviceAttributes {
            max_qp: attr.max_qp,
            max_cq: attr.max_cq,
            max_mr: attr.max_mr,
        })
    }

    #[cfg(not(feature = "hardware"))]
    pub fn query_attributes(&self) -> Result<DeviceAttributes, FabricError> {
        Err(FabricError::NotAvailable)
    }

    #[cfg(feature = "hardware")]
    pub fn query_port(&self, port_num: u8, gid_index: u8) -> Result<PortAttributes, FabricError> {
        let mut attr: ibv_port_attr = unsafe { std::mem::zeroed() };
        let ret = unsafe { ibv_query_port(self.context, port_num, &mut attr) };
        if ret != 0 {
            return Err(FabricError::PortQueryFailed(port_num));
        }

        let mut gid: ibv_gid = unsafe { std::mem::zeroed() };
        let ret = unsafe { ibv_query_gid(self.context, port_num, gid_index as i32, &mut gid) };
        if ret != 0 {
            return Err(FabricError::PortQueryFailed(port_num));
        }

        Ok(PortAttributes {
            lid: attr.lid,
            gid: unsafe { gid.raw },
        })
    }

    #[cfg(not(feature = "hardware"))]
    pub fn query_port(&self, _port_num: u8, _gid_index: u8) -> Result<PortAttributes, FabricError> {
        Err(FabricError::NotAvailable)
    }

    /// Register a pre-allocated buffer for remote READ (and local write, for
    /// host-side zeroing). `addr`/`length` must describe memory that outlives
    /// the returned handle.
    #[cfg(feature = "hardware")]
    pub fn register_memory(&self, addr: *mut u8, length: usize) -> Result<MemoryRegion, FabricError> {
        let access = IBV_ACCESS_LOCAL_WRITE | IBV_ACCESS_REMOTE_READ | IBV_ACCESS_REMOTE_WRITE;
        let mr = unsafe { ibv_reg_mr(self.pd, addr as *mut libc::c_void, length, access as i32) };
        if mr.is_null() {
            return Err(FabricError::MrRegisterFailed);
        }
        let lkey = unsafe { (*mr).lkey };
        let rkey = unsafe { (*mr).rkey };
        debug!("registered MR: addr={addr:?} len={length} lkey=0x{lkey:x} rkey=0x{rkey:x}");
        Ok(MemoryRegion {
            mr,
            addr,
            length,
            lkey,
            rkey,
        })
    }

    #[cfg(not(feature = "hardware"))]
    pub fn register_memory(&self, _addr: *mut u8, _length: usize) -> Result<MemoryRegion, FabricError> {
        Err(FabricError::NotAvailable)
    }

    #[cfg(feature = "hardware")]
    pub(crate) fn context(&self) -> *mut ibv_context {
        self.context
    }

    #[cfg(feature = "hardware")]
    pub(crate) fn pd(&self) -> *mut ibv_pd {
        self.pd
    }
}

impl Drop for RdmaDevice {
    fn drop(&mut self) {
        #[cfg(feature = "hardware")]
        {
            debug!("closing RDMA device {}", self.device_name);
            unsafe {
                if !self.pd.is_null() {
                    ibv_dealloc_pd(self.pd);
                }
                if !self.context.is_null() {
                    ibv_close_device(self.context);
                }
            }
        }
    }
}

/// A memory region registered for remote access. The registration is torn
/// down when this handle drops; the underlying buffer is owned by the
/// caller, not by this type.
pub struct MemoryRegion {
    #[cfg(feature = "hardware")]
    mr: *mut ibv_mr,
    pub addr: *mut u8,
    pub length: usize,
    pub lkey: u32,
    pub rkey: u32,
}

unsafe impl Send for MemoryRegion {}
unsafe impl Sync for MemoryRegion {}

impl Drop for MemoryRegion {
    fn drop(&mut self) {
        #[cfg(feature = "hardware")]
        unsafe {
            if !self.mr.is_null() {
                ibv_dereg_mr(self.mr);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceAttributes {
    pub max_qp: i32,
    pub max_cq: i32,
    pub max_mr: i32,
}

#[derive(Debug, Clone)]
pub struct PortAttributes {
    pub lid: u16,
    pub gid: [u8; 16],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg_attr(feature = "hardware", ignore = "requires RDMA hardware")]
    fn open_unknown_device_fails() {
        let result = RdmaDevice::open("definitely-not-a-real-device");
        assert!(result.is_err());
    }
}
