//! Struct declarations behind the supported raw kstats.
//!
//! Each table follows the member order of the illumos header it names.
//! Members the kernel no longer maintains are declared as `Skip` so that the
//! members after them keep their offsets.

use crate::decode::layout::{CType, Layout, Slot};
use crate::model::FieldType;

use CType::{Char, Int, UInt, ULongLong};
use Slot::{Field, Skip, Typed};

/// `unix:*:var`, `struct var` from `<sys/var.h>`.
pub static VAR: Layout = Layout {
    name: "struct var",
    slots: &[
        Field("v_buf", Int),
        Field("v_call", Int),
        Field("v_proc", Int),
        Field("v_maxupttl", Int),
        Field("v_nglobpris", Int),
        Field("v_maxsyspri", Int),
        Field("v_clist", Int),
        Field("v_maxup", Int),
        Field("v_hbuf", Int),
        Field("v_hmask", Int),
        Field("v_pbuf", Int),
        Field("v_sptmap", Int),
        Field("v_maxpmem", Int),
        Field("v_autoup", Int),
        Field("v_bufhwm", Int),
    ],
};

/// `unix:*:ncstats`, `struct ncstats` from `<sys/dnlc.h>`.
pub static NCSTATS: Layout = Layout {
    name: "struct ncstats",
    slots: &[
        Field("hits", Int),
        Field("misses", Int),
        Field("enters", Int),
        Field("dbl_enters", Int),
        Field("long_enter", Int),
        Field("long_look", Int),
        Field("move_to_front", Int),
        Field("purges", Int),
    ],
};

/// `unix:*:sysinfo`, `sysinfo_t` from `<sys/sysinfo.h>`.
pub static SYSINFO: Layout = Layout {
    name: "sysinfo_t",
    slots: &[
        Field("updates", UInt),
        Field("runque", UInt),
        Field("runocc", UInt),
        Field("swpque", UInt),
        Field("swpocc", UInt),
        Field("waiting", UInt),
    ],
};

/// `unix:*:vminfo`, `vminfo_t` from `<sys/sysinfo.h>`.
///
/// Newer kernels append a sixth `updates` counter. It is left out of the
/// declaration so blobs from kernels without it still decode.
pub static VMINFO: Layout = Layout {
    name: "vminfo_t",
    slots: &[
        Field("freemem", ULongLong),
        Field("swap_resv", ULongLong),
        Field("swap_alloc", ULongLong),
        Field("swap_avail", ULongLong),
        Field("swap_free", ULongLong),
    ],
};

/// `KNC_STRSIZE` from `<sys/netconfig.h>`.
pub const KNC_STRSIZE: usize = 128;
/// `SYS_NMLN` from `<sys/utsname.h>`.
pub const SYS_NMLN: usize = 257;

/// `nfs:*:mntinfo`, `struct mntinfo_kstat` from `<nfs/nfs_clnt.h>`.
///
/// `mik_timers` holds `NFS_CALLTYPES + 1` round-trip timers; the first
/// three (lookup, read, write) are flattened into named fields.
pub static MNTINFO: Layout = Layout {
    name: "struct mntinfo_kstat",
    slots: &[
        Field("mik_proto", Char(KNC_STRSIZE)),
        Field("mik_vers", UInt),
        Field("mik_flags", UInt),
        Field("mik_secmod", UInt),
        Field("mik_curread", UInt),
        Field("mik_curwrite", UInt),
        Field("mik_timeo", Int),
        Field("mik_retrans", Int),
        Field("mik_acregmin", UInt),
        Field("mik_acregmax", UInt),
        Field("mik_acdirmin", UInt),
        Field("mik_acdirmax", UInt),
        Field("lookup_srtt", UInt),
        Field("lookup_deviate", UInt),
        Field("lookup_rtxcur", UInt),
        Field("read_srtt", UInt),
        Field("read_deviate", UInt),
        Field("read_rtxcur", UInt),
        Field("write_srtt", UInt),
        Field("write_deviate", UInt),
        Field("write_rtxcur", UInt),
        Skip(UInt),
        Skip(UInt),
        Skip(UInt),
        Field("mik_noresponse", UInt),
        Field("mik_failover", UInt),
        Field("mik_remap", UInt),
        Field("mik_curserver", Char(SYS_NMLN)),
    ],
};

/// `cpu_stat:*:*`, `cpu_stat_t` from `<sys/sysinfo.h>`: `cpu_sysinfo_t`,
/// `cpu_syswait_t` and `cpu_vminfo_t` back to back.
pub static CPU_STAT: Layout = Layout {
    name: "cpu_stat_t",
    slots: &[
        // cpu_sysinfo_t: cpu[CPU_STATES]
        Field("idle", UInt),
        Field("user", UInt),
        Field("kernel", UInt),
        Field("wait", UInt),
        // wait[W_STATES]
        Field("wait_io", UInt),
        Field("wait_swap", UInt),
        Field("wait_pio", UInt),
        Field("bread", UInt),
        Field("bwrite", UInt),
        Field("lread", UInt),
        Field("lwrite", UInt),
        Field("phread", UInt),
        Field("phwrite", UInt),
        Field("pswitch", UInt),
        Field("trap", UInt),
        Field("intr", UInt),
        Field("syscall", UInt),
        Field("sysread", UInt),
        Field("syswrite", UInt),
        Field("sysfork", UInt),
        Field("sysvfork", UInt),
        Field("sysexec", UInt),
        Field("readch", UInt),
        Field("writech", UInt),
        // rcvint, xmtint, mdmint
        Skip(UInt),
        Skip(UInt),
        Skip(UInt),
        Field("rawch", UInt),
        Field("canch", UInt),
        Field("outch", UInt),
        Field("msg", UInt),
        Field("sema", UInt),
        Field("namei", UInt),
        Field("ufsiget", UInt),
        Field("ufsdirblk", UInt),
        Field("ufsipage", UInt),
        Field("ufsinopage", UInt),
        Field("inodeovf", UInt),
        Field("fileovf", UInt),
        Field("procovf", UInt),
        Field("intrthread", UInt),
        Field("intrblk", UInt),
        Field("idlethread", UInt),
        Field("inv_swtch", UInt),
        Field("nthreads", UInt),
        Field("cpumigrate", UInt),
        Field("xcalls", UInt),
        Field("mutex_adenters", UInt),
        Field("rw_rdfails", UInt),
        Field("rw_wrfails", UInt),
        Field("modload", UInt),
        Field("modunload", UInt),
        Field("bawrite", UInt),
        // rw_enters, win_uo_cnt, win_uu_cnt, win_so_cnt, win_su_cnt, win_suo_cnt
        Skip(UInt),
        Skip(UInt),
        Skip(UInt),
        Skip(UInt),
        Skip(UInt),
        Skip(UInt),
        // cpu_syswait_t
        Typed("iowait", Int, FieldType::UInt32),
        Skip(Int),
        Skip(Int),
        // cpu_vminfo_t
        Field("pgrec", UInt),
        Field("pgfrec", UInt),
        Field("pgin", UInt),
        Field("pgpgin", UInt),
        Field("pgout", UInt),
        Field("pgpgout", UInt),
        Field("swapin", UInt),
        Field("pgswapin", UInt),
        Field("swapout", UInt),
        Field("pgswapout", UInt),
        Field("zfod", UInt),
        Field("dfree", UInt),
        Field("scan", UInt),
        Field("rev", UInt),
        Field("hat_fault", UInt),
        Field("as_fault", UInt),
        Field("maj_fault", UInt),
        Field("cow_fault", UInt),
        Field("prot_fault", UInt),
        Field("softlock", UInt),
        Field("kernel_asflt", UInt),
        Field("pgrrun", UInt),
        Field("execpgin", UInt),
        Field("execpgout", UInt),
        Field("execfree", UInt),
        Field("anonpgin", UInt),
        Field("anonpgout", UInt),
        Field("anonfree", UInt),
        Field("fspgin", UInt),
        Field("fspgout", UInt),
        Field("fsfree", UInt),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::layout::DataModel;

    #[test]
    fn test_struct_sizes() {
        for model in [DataModel::Ilp32, DataModel::Lp64] {
            assert_eq!(VAR.compile(model).size, 60);
            assert_eq!(NCSTATS.compile(model).size, 32);
            assert_eq!(SYSINFO.compile(model).size, 24);
            assert_eq!(CPU_STAT.compile(model).size, 372);
            assert_eq!(MNTINFO.compile(model).size, 492);
        }
        assert_eq!(VMINFO.compile(DataModel::Lp64).size, 40);
    }

    #[test]
    fn test_cpu_stat_sub_struct_offsets() {
        let c = CPU_STAT.compile(DataModel::Lp64);
        let off = |n: &str| c.member(n).map(|m| m.offset);
        assert_eq!(off("idle"), Some(0));
        assert_eq!(off("wait_io"), Some(16));
        assert_eq!(off("bread"), Some(28));
        assert_eq!(off("rawch"), Some(27 * 4));
        assert_eq!(off("bawrite"), Some(52 * 4));
        assert_eq!(off("iowait"), Some(236));
        assert_eq!(off("pgrec"), Some(248));
        assert_eq!(off("fsfree"), Some(248 + 30 * 4));
        assert_eq!(c.members.len(), 82);
    }

    #[test]
    fn test_mntinfo_offsets() {
        let c = MNTINFO.compile(DataModel::Lp64);
        let off = |n: &str| c.member(n).map(|m| m.offset);
        assert_eq!(off("mik_vers"), Some(128));
        assert_eq!(off("lookup_srtt"), Some(172));
        assert_eq!(off("write_rtxcur"), Some(172 + 8 * 4));
        assert_eq!(off("mik_noresponse"), Some(220));
        assert_eq!(off("mik_curserver"), Some(232));
        assert_eq!(c.members.len(), 25);
    }
}
