//! Pre-built mock chains.
//!
//! Values are taken from a small two-CPU illumos machine so that output
//! of the dump tool looks like the real thing.

use super::chain::MockChain;
use crate::decode::raw::tables;
use crate::decode::{BlobWriter, DataModel, IoFields, NamedBlob};

impl MockChain {
    /// A typical system: every payload type, every supported raw layout,
    /// one policy-ignored raw kstat and one raw kstat nobody can decode.
    ///
    /// The returned handle is already up to date with its kernel side.
    pub fn typical_system() -> Self {
        let model = DataModel::NATIVE;
        let mut chain = Self::new();

        // ── Named ──

        let mut misc = NamedBlob::new();
        misc.uint32("ncpus", 2)
            .uint32("lbolt", 4_812_557)
            .uint32("deficit", 0)
            .uint32("clk_intr", 4_812_557)
            .uint32("vac", 0)
            .uint32("nproc", 87)
            .uint32("avenrun_1min", 35)
            .uint32("avenrun_5min", 29)
            .uint32("avenrun_15min", 21)
            .uint32("boot_time", 1_760_000_000)
            .uint32("nsec_per_tick", 10_000_000);
        chain.add_named("unix", 0, "system_misc", "misc", &misc);

        let mut pages = NamedBlob::new();
        pages
            .uint64("physmem", 1_046_250)
            .uint64("nalloc", 0)
            .uint64("nfree", 0)
            .uint64("freemem", 512_204)
            .uint64("availrmem", 900_114)
            .uint64("lotsfree", 16_347)
            .uint64("desfree", 8_173)
            .uint64("minfree", 4_086)
            .uint64("pp_kernel", 121_004);
        chain.add_named("unix", 0, "system_pages", "pages", &pages);

        for cpu in 0..2 {
            let mut info = NamedBlob::new();
            info.char("state", "on-line")
                .int64("state_begin", 1_760_000_010)
                .char("cpu_type", "i386")
                .char("fpu_type", "i387 compatible")
                .int64("clock_MHz", 2_394)
                .int64("chip_id", 0)
                .int64("core_id", cpu)
                .string("brand", Some("Intel(r) Xeon(r) CPU E5-2680 v4 @ 2.40GHz"))
                .string("vendor_string", Some("GenuineIntel"))
                .string("implementation", None);
            chain.add_named("cpu_info", cpu as i32, &format!("cpu_info{}", cpu), "misc", &info);

            let mut sys = NamedBlob::new();
            sys.uint64("cpu_ticks_idle", 9_100_455 + cpu as u64 * 311)
                .uint64("cpu_ticks_user", 120_004)
                .uint64("cpu_ticks_kernel", 88_012)
                .uint64("cpu_ticks_wait", 0)
                .uint64("syscall", 40_122_980)
                .uint64("pswitch", 8_554_120)
                .uint64("intr", 3_004_557);
            chain.add_named("cpu", cpu as i32, "sys", "misc", &sys);
        }

        let mut zone = NamedBlob::new();
        zone.string("zonename", Some("global"))
            .uint64("nsec_user", 1_203_330_112_004)
            .uint64("nsec_sys", 884_120_556_310)
            .uint64("nsec_waitrq", 12_004_556)
            .int64("crtime", 0);
        chain.add_named("zones", 0, "global", "zone_misc", &zone);

        // ── IO ──

        chain.add_io(
            "sd",
            0,
            "sd0",
            "disk",
            &IoFields {
                nread: 7_654_842_368,
                nwritten: 21_004_558_336,
                reads: 412_331,
                writes: 1_902_774,
                wtime: 2_004_556_120,
                wlentime: 4_120_887_310,
                wlastupdate: 9_001_224_556_120,
                rtime: 880_412_556_003,
                rlentime: 1_202_334_556_110,
                rlastupdate: 9_001_224_556_301,
                wcnt: 0,
                rcnt: 1,
            },
        );
        chain.add_io(
            "sd",
            1,
            "sd1",
            "disk",
            &IoFields {
                nread: 1_048_576,
                reads: 256,
                ..IoFields::default()
            },
        );
        chain.add_io(
            "nfs",
            1,
            "nfs1",
            "nfs",
            &IoFields {
                nread: 4_096_000,
                nwritten: 512_000,
                reads: 1_000,
                writes: 125,
                ..IoFields::default()
            },
        );

        // ── Interrupt ──

        chain.add_intr("ehci", 0, "ehci0", "controller", [1_204_558, 0, 0, 3, 0]);
        chain.add_intr("mpt_sas", 0, "mpt_sas0", "controller", [8_845_120, 12, 0, 0, 44]);

        // ── Timer ──

        chain.add_timer("kstat", 0, "ufs_timers", "misc");

        // ── Raw ──

        let var = tables::VAR.compile(model);
        let blob = BlobWriter::new(&var)
            .set("v_buf", 100)
            .set("v_call", 0)
            .set("v_proc", 30_000)
            .set("v_maxupttl", 29_995)
            .set("v_nglobpris", 110)
            .set("v_maxsyspri", 99)
            .set("v_clist", 0)
            .set("v_maxup", 29_995)
            .set("v_hbuf", 8_192)
            .set("v_hmask", 8_191)
            .set("v_pbuf", 0)
            .set("v_sptmap", 0)
            .set("v_maxpmem", 0)
            .set("v_autoup", 30)
            .set("v_bufhwm", 83_700)
            .finish();
        chain.add_raw("unix", 0, "var", "misc", 1, blob);

        let ncstats = tables::NCSTATS.compile(model);
        let blob = BlobWriter::new(&ncstats)
            .set("hits", 2_004_331)
            .set("misses", 40_112)
            .set("enters", 38_991)
            .set("dbl_enters", 12)
            .set("long_enter", 0)
            .set("long_look", 0)
            .set("move_to_front", 10_442)
            .set("purges", 3)
            .finish();
        chain.add_raw("unix", 0, "ncstats", "misc", 1, blob);

        let sysinfo = tables::SYSINFO.compile(model);
        let blob = BlobWriter::new(&sysinfo)
            .set("updates", 48_125)
            .set("runque", 14)
            .set("runocc", 11)
            .set("swpque", 0)
            .set("swpocc", 0)
            .set("waiting", 0)
            .finish();
        chain.add_raw("unix", 0, "sysinfo", "misc", 1, blob);

        let vminfo = tables::VMINFO.compile(model);
        let blob = BlobWriter::new(&vminfo)
            .set_u64("freemem", 24_650_445_312)
            .set_u64("swap_resv", 7_120_334_112)
            .set_u64("swap_alloc", 5_004_113_001)
            .set_u64("swap_avail", 30_221_004_556)
            .set_u64("swap_free", 32_337_225_667)
            .finish();
        chain.add_raw("unix", 0, "vminfo", "vm", 1, blob);

        let cpu_stat = tables::CPU_STAT.compile(model);
        for cpu in 0..2 {
            let blob = BlobWriter::new(&cpu_stat)
                .set("idle", 9_100_455 + cpu * 311)
                .set("user", 120_004)
                .set("kernel", 88_012)
                .set("wait", 0)
                .set("wait_io", 0)
                .set("bread", 1_204)
                .set("bwrite", 3_301)
                .set("lread", 88_120)
                .set("lwrite", 20_334)
                .set("pswitch", 4_277_060)
                .set("trap", 1_203_344)
                .set("intr", 1_502_278)
                .set("syscall", 20_061_490)
                .set("sysread", 3_004_112)
                .set("syswrite", 1_556_120)
                .set("sysfork", 20_112)
                .set("sysexec", 19_880)
                .set("readch", 880_120_556)
                .set("writech", 120_556_003)
                .set("namei", 440_112)
                .set("inv_swtch", 3_120)
                .set("nthreads", 2_004)
                .set("cpumigrate", 44_120)
                .set("xcalls", 501_223)
                .set("mutex_adenters", 1_204)
                .set("modload", 112)
                .set("bawrite", 4)
                .set("iowait", 0)
                .set("pgrec", 1_120)
                .set("pgin", 3_004)
                .set("pgpgin", 12_016)
                .set("zfod", 440_556)
                .set("hat_fault", 12_004)
                .set("as_fault", 880_331)
                .set("maj_fault", 3_120)
                .set("prot_fault", 120_556)
                .set("execpgin", 2_004)
                .set("fspgin", 1_000)
                .finish();
            chain.add_raw("cpu_stat", cpu as i32, &format!("cpu_stat{}", cpu), "misc", 1, blob);
        }

        let mntinfo = tables::MNTINFO.compile(model);
        let blob = BlobWriter::new(&mntinfo)
            .set_text("mik_proto", "tcp")
            .set("mik_vers", 4)
            .set("mik_flags", 0x0020_8000)
            .set("mik_secmod", 1)
            .set("mik_curread", 1_048_576)
            .set("mik_curwrite", 1_048_576)
            .set("mik_timeo", 600)
            .set("mik_retrans", 5)
            .set("mik_acregmin", 3)
            .set("mik_acregmax", 60)
            .set("mik_acdirmin", 30)
            .set("mik_acdirmax", 60)
            .set("lookup_srtt", 6)
            .set("lookup_deviate", 3)
            .set("lookup_rtxcur", 12)
            .set("read_srtt", 9)
            .set("read_deviate", 4)
            .set("read_rtxcur", 18)
            .set("write_srtt", 14)
            .set("write_deviate", 6)
            .set("write_rtxcur", 27)
            .set("mik_noresponse", 0)
            .set("mik_failover", 0)
            .set("mik_remap", 0)
            .set_text("mik_curserver", "filer01")
            .finish();
        chain.add_raw("nfs", 1, "mntinfo", "misc", 1, blob);

        let mut phys = Vec::new();
        for (address, size) in [
            (0x1000u64, 0x9e000u64),
            (0x100000, 0x7fe00000),
            (0x100000000, 0x80000000),
        ] {
            phys.extend_from_slice(&address.to_ne_bytes());
            phys.extend_from_slice(&size.to_ne_bytes());
        }
        chain.add_raw("mm", 0, "phys_installed", "misc", 3, phys);

        chain.add_raw("unix", 0, "sfmmu_percpu_stat", "misc", 1, vec![0; 64]);
        chain.add_raw("unix", 0, "kstat_headers", "kstat", 1, vec![0; 128]);

        chain.sync();
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::KstatChain;
    use crate::model::{KstatId, KstatType};

    #[test]
    fn test_typical_system_is_current() {
        let chain = MockChain::typical_system();
        let headers = chain.headers();
        assert_eq!(headers.len(), chain.kernel_len());
        assert!(chain.chain_id() > 0);
        for ty in [
            KstatType::Named,
            KstatType::Io,
            KstatType::Intr,
            KstatType::Raw,
            KstatType::Timer,
        ] {
            assert!(headers.iter().any(|h| h.kstat_type == ty), "missing {}", ty);
        }
    }

    #[test]
    fn test_typical_system_identities_are_unique() {
        let chain = MockChain::typical_system();
        let mut ids: Vec<KstatId> = chain.headers().into_iter().map(|h| h.id).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }
}
