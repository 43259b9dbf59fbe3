//! 可执行镜像的装载。
//!
//! 只负责架构校验、把 PT_LOAD 段放进地址空间、以及在用户栈上摆好
//! argv/envp。镜像字节从哪里来（文件系统、内存盘）是外面的事

use compact_str::CompactString;
use defines::{
    config::PTR_SIZE,
    error::{errno, KResult},
};
use goblin::elf::{header, program_header, Elf};

use crate::memory::{MapPermission, MemorySpace};

const PAGE_MASK: usize = defines::config::PAGE_SIZE - 1;

/// 校验并装载一个 ELF 镜像，返回入口地址
pub(crate) fn load_elf(memory_space: &mut MemorySpace, elf_data: &[u8]) -> KResult<usize> {
    let elf = Elf::parse(elf_data).map_err(|e| {
        warn!("parse elf error {e}");
        errno::ENOEXEC
    })?;
    // 架构必须匹配
    if !elf.is_64 || elf.header.e_machine != header::EM_RISCV {
        warn!(
            "elf has invalid architecture (machine {})",
            elf.header.e_machine
        );
        return Err(errno::EINVAL);
    }

    for ph in &elf.program_headers {
        if ph.p_type != program_header::PT_LOAD {
            continue;
        }
        let start = ph.p_vaddr as usize & !PAGE_MASK;
        let end = (ph.p_vaddr as usize + ph.p_memsz as usize + PAGE_MASK) & !PAGE_MASK;
        let mut perm = MapPermission::U;
        if ph.p_flags & program_header::PF_R != 0 {
            perm |= MapPermission::R;
        }
        if ph.p_flags & program_header::PF_W != 0 {
            perm |= MapPermission::W;
        }
        if ph.p_flags & program_header::PF_X != 0 {
            perm |= MapPermission::X;
        }
        memory_space.allocate_fixed(start, end - start, perm)?;
        let file_range = ph.file_range();
        if file_range.end > elf_data.len() {
            return Err(errno::ENOEXEC);
        }
        memory_space.write(ph.p_vaddr as usize, &elf_data[file_range])?;
    }

    Ok(elf.entry as usize)
}

/// 在用户栈上推入参数与环境变量。
///
/// 返回 `(user_sp, argv_base, envp_base)`；`user_sp` 处放着 argc
pub(crate) fn init_stack(
    memory_space: &mut MemorySpace,
    stack_top: usize,
    args: &[CompactString],
    envs: &[CompactString],
) -> KResult<(usize, usize, usize)> {
    let mut sp = stack_top;

    let mut push_str = |sp: &mut usize, s: &CompactString| -> KResult<usize> {
        *sp -= s.len() + 1;
        memory_space.write(*sp, s.as_bytes())?;
        memory_space.write(*sp + s.len(), &[0])?;
        Ok(*sp)
    };

    let mut env_ptrs = alloc::vec::Vec::with_capacity(envs.len() + 1);
    for env in envs {
        env_ptrs.push(push_str(&mut sp, env)?);
    }
    env_ptrs.push(0);

    let mut arg_ptrs = alloc::vec::Vec::with_capacity(args.len() + 1);
    for arg in args {
        arg_ptrs.push(push_str(&mut sp, arg)?);
    }
    arg_ptrs.push(0);

    sp &= !0xf;

    let mut push_ptrs = |sp: &mut usize, ptrs: &[usize]| -> KResult<usize> {
        *sp -= ptrs.len() * PTR_SIZE;
        let base = *sp;
        for (i, ptr) in ptrs.iter().enumerate() {
            memory_space.write(base + i * PTR_SIZE, &ptr.to_ne_bytes())?;
        }
        Ok(base)
    };

    let envp_base = push_ptrs(&mut sp, &env_ptrs)?;
    let argv_base = push_ptrs(&mut sp, &arg_ptrs)?;

    sp -= PTR_SIZE;
    memory_space.write(sp, &args.len().to_ne_bytes())?;

    Ok((sp, argv_base, envp_base))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use defines::config::PAGE_SIZE;

    /// 手工拼一个最小的 ELF64：一个 PT_LOAD 段，内容是 `payload`
    pub(crate) fn tiny_elf(machine: u16, vaddr: usize, payload: &[u8]) -> alloc::vec::Vec<u8> {
        let mut elf = alloc::vec![0_u8; 0x78 + payload.len()];
        // e_ident
        elf[0..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
        elf[4] = 2; // ELFCLASS64
        elf[5] = 1; // little endian
        elf[6] = 1; // EV_CURRENT
        elf[16..18].copy_from_slice(&2_u16.to_le_bytes()); // ET_EXEC
        elf[18..20].copy_from_slice(&machine.to_le_bytes());
        elf[20..24].copy_from_slice(&1_u32.to_le_bytes()); // e_version
        elf[24..32].copy_from_slice(&(vaddr as u64).to_le_bytes()); // e_entry
        elf[32..40].copy_from_slice(&0x40_u64.to_le_bytes()); // e_phoff
        elf[52..54].copy_from_slice(&0x40_u16.to_le_bytes()); // e_ehsize
        elf[54..56].copy_from_slice(&0x38_u16.to_le_bytes()); // e_phentsize
        elf[56..58].copy_from_slice(&1_u16.to_le_bytes()); // e_phnum

        // program header at 0x40
        elf[0x40..0x44].copy_from_slice(&1_u32.to_le_bytes()); // PT_LOAD
        elf[0x44..0x48].copy_from_slice(&(program_header::PF_R | program_header::PF_X).to_le_bytes());
        elf[0x48..0x50].copy_from_slice(&0x78_u64.to_le_bytes()); // p_offset
        elf[0x50..0x58].copy_from_slice(&(vaddr as u64).to_le_bytes()); // p_vaddr
        elf[0x58..0x60].copy_from_slice(&(vaddr as u64).to_le_bytes()); // p_paddr
        elf[0x60..0x68].copy_from_slice(&(payload.len() as u64).to_le_bytes()); // p_filesz
        elf[0x68..0x70].copy_from_slice(&(payload.len() as u64).to_le_bytes()); // p_memsz
        elf[0x70..0x78].copy_from_slice(&(PAGE_SIZE as u64).to_le_bytes()); // p_align
        elf[0x78..].copy_from_slice(payload);
        elf
    }

    #[test]
    fn load_elf_maps_segments_and_returns_entry() {
        let mut space = MemorySpace::new();
        let elf = tiny_elf(header::EM_RISCV, 0x1_0000, b"\x13\0\0\0");
        let entry = load_elf(&mut space, &elf).unwrap();
        assert_eq!(entry, 0x1_0000);
        let mut buf = [0_u8; 4];
        space.read(0x1_0000, &mut buf).unwrap();
        assert_eq!(&buf, b"\x13\0\0\0");
    }

    #[test]
    fn foreign_architecture_is_rejected() {
        let mut space = MemorySpace::new();
        let elf = tiny_elf(header::EM_X86_64, 0x1_0000, b"\x90");
        assert_eq!(load_elf(&mut space, &elf), Err(errno::EINVAL));
    }

    #[test]
    fn garbage_is_enoexec() {
        let mut space = MemorySpace::new();
        assert_eq!(
            load_elf(&mut space, b"definitely not an elf"),
            Err(errno::ENOEXEC)
        );
    }

    #[test]
    fn init_stack_lays_out_argc_argv() {
        let mut space = MemorySpace::new();
        let stack_vaddr = space
            .allocate_range(
                4 * PAGE_SIZE,
                0x2000_0000..0x3000_0000,
                MapPermission::R | MapPermission::W,
            )
            .unwrap();
        let top = stack_vaddr + 4 * PAGE_SIZE;
        let args = [CompactString::from("init"), CompactString::from("-s")];
        let (sp, argv_base, _envp_base) =
            init_stack(&mut space, top, &args, &[]).unwrap();
        assert_eq!(sp % 8, 0);

        let mut buf = [0_u8; 8];
        space.read(sp, &mut buf).unwrap();
        assert_eq!(usize::from_ne_bytes(buf), 2); // argc

        space.read(argv_base, &mut buf).unwrap();
        let argv0 = usize::from_ne_bytes(buf);
        let mut name = [0_u8; 4];
        space.read(argv0, &mut name).unwrap();
        assert_eq!(&name, b"init");
        // argv 以 NULL 结尾
        space.read(argv_base + 2 * 8, &mut buf).unwrap();
        assert_eq!(usize::from_ne_bytes(buf), 0);
    }
}
