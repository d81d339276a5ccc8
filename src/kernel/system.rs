use anyhow::Result;

use super::{HostKernel, SyscallCtx};

const UTS_FIELD: usize = 65;

impl HostKernel {
    /// uname(buf): the host's `struct utsname`, six 65-byte fields.
    pub(super) fn sys_uname(ctx: &mut SyscallCtx<'_>) -> Result<i64> {
        let (buf,): (u64,) = ctx.args()?;
        let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
        let result = unsafe { libc::uname(&mut uts) };
        if result != 0 {
            return Ok(Self::libc_to_kernel(result as i64));
        }

        let mut data = Vec::with_capacity(UTS_FIELD * 6);
        for field in [
            &uts.sysname[..],
            &uts.nodename[..],
            &uts.release[..],
            &uts.version[..],
            &uts.machine[..],
            &uts.domainname[..],
        ] {
            data.extend(uts_field(field));
        }
        if ctx.write_bytes(buf, &data).is_err() {
            return Ok(-(libc::EFAULT as i64));
        }
        Ok(0)
    }
}

fn uts_field(field: &[libc::c_char]) -> Vec<u8> {
    let mut out: Vec<u8> = field.iter().take(UTS_FIELD).map(|&c| c as u8).collect();
    out.resize(UTS_FIELD, 0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        arch::{Reg, X86_64},
        backend::Backend,
        kernel::{Kernel, Outcome},
        soft::SoftCpu,
        syscall::Syscall,
    };

    #[test]
    fn writes_six_fixed_width_fields() {
        let mut cpu = SoftCpu::new(&X86_64);
        cpu.mem_map(0x1000, 0x1000).unwrap();
        cpu.reg_write(Reg::Rdi, 0x1000).unwrap();
        let mut ctx = SyscallCtx::new(&mut cpu, &X86_64);

        let out = HostKernel::new().call(Syscall::Uname, &mut ctx).unwrap();
        assert_eq!(out, Outcome::Return(0));

        let buf = cpu.mem_read_vec(0x1000, UTS_FIELD * 6).unwrap();
        assert!(buf.starts_with(b"Linux\0"));
        let machine = &buf[UTS_FIELD * 4..UTS_FIELD * 5];
        assert_ne!(machine[0], 0);
    }
}
