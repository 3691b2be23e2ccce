//! Real-time scheduling helpers (Linux SCHED_FIFO + mlockall).

#[cfg(target_os = "linux")]
pub fn setup_rt_once(rt: bool, prio: Option<i32>) {
    use libc::{
        MCL_CURRENT, MCL_FUTURE, SCHED_FIFO, mlockall, sched_get_priority_max,
        sched_get_priority_min, sched_param, sched_setscheduler,
    };
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !rt {
        return;
    }

    // Apply SCHED_FIFO priority, clamped to the system range.
    fn try_apply_fifo_priority(prio: Option<i32>) -> eyre::Result<i32> {
        let (min, max) = unsafe {
            let min = sched_get_priority_min(SCHED_FIFO);
            let max = sched_get_priority_max(SCHED_FIFO);
            if min < 0 || max < 0 {
                (1, 99)
            } else {
                (min, max)
            }
        };
        let prio_val = prio.unwrap_or(max).clamp(min, max);
        let param = sched_param {
            sched_priority: prio_val,
        };
        let rc = unsafe { sched_setscheduler(0, SCHED_FIFO, &param) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EPERM) {
                eyre::bail!("{err}; hint: needs CAP_SYS_NICE or root");
            }
            return Err(eyre::eyre!(err));
        }
        Ok(prio_val)
    }

    fn try_lock_memory() -> std::io::Result<()> {
        let rc = unsafe { mlockall(MCL_CURRENT | MCL_FUTURE) };
        if rc != 0 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    RT_ONCE.get_or_init(|| {
        match try_lock_memory() {
            Ok(()) => tracing::info!("RT: memory locked (current|future)"),
            Err(err) => tracing::warn!(error = %err, "mlockall failed; hint: needs CAP_IPC_LOCK and enough 'ulimit -l'"),
        }
        match try_apply_fifo_priority(prio) {
            Ok(p) => tracing::info!(prio = p, "RT: SCHED_FIFO enabled"),
            Err(err) => {
                let prio_dbg = prio
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "(max)".into());
                tracing::warn!(error = %err, prio = %prio_dbg, "sched_setscheduler(SCHED_FIFO) failed");
            }
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(rt: bool, _prio: Option<i32>) {
    if rt {
        tracing::warn!("real-time mode is only supported on Linux; continuing without it");
    }
}
