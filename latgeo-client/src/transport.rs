use std::io;
use std::thread;
use std::time::{Duration, Instant};

use latgeo_core::{ProbeError, ProbeTransport};
use tracing::debug;

#[cfg(target_os = "linux")]
use latgeo_os_linux as os;

#[cfg(not(target_os = "linux"))]
compile_error!("latgeo probes through Linux ICMP sockets");

/// Averages `samples` ICMP echoes sent `spacing` apart, all inside `timeout`.
pub struct IcmpTransport {
    spacing: Duration,
    pacing_spin_us: u64,
}

impl IcmpTransport {
    pub fn new(spacing: Duration, pacing_spin_us: u64) -> Self {
        Self {
            spacing,
            pacing_spin_us,
        }
    }
}

impl ProbeTransport for IcmpTransport {
    fn measure(
        &self,
        address: &str,
        samples: usize,
        timeout: Duration,
    ) -> Result<Duration, ProbeError> {
        let addr = os::resolve_first(address).map_err(|_| ProbeError::Resolve {
            address: address.to_string(),
        })?;
        let mut prober = os::IcmpProber::new(addr).map_err(probe_error)?;
        debug!(address, kind = ?prober.kind(), "probe socket open");

        let rtts = collect_samples(samples, self.spacing, timeout, self.pacing_spin_us, |wait| {
            prober.echo(wait).unwrap_or_else(|err| {
                debug!(address, %err, "echo failed");
                None
            })
        });

        mean_rtt(&rtts).ok_or_else(|| ProbeError::NoResponse {
            address: address.to_string(),
            timeout_ms: timeout.as_millis(),
        })
    }
}

/// Sends up to `samples` echoes `spacing` apart inside `timeout`.
///
/// Every echo but the last waits at most one spacing for its reply, so a lost
/// echo costs one slot instead of the rest of the budget.
fn collect_samples<F>(
    samples: usize,
    spacing: Duration,
    timeout: Duration,
    pacing_spin_us: u64,
    mut echo: F,
) -> Vec<f64>
where
    F: FnMut(Duration) -> Option<f64>,
{
    let deadline = Instant::now() + timeout;
    let mut rtts = Vec::with_capacity(samples);
    let mut next_send = Instant::now();

    for i in 0..samples {
        if i > 0 {
            next_send += spacing;
            if next_send >= deadline {
                break;
            }
            sleep_until(next_send, pacing_spin_us);
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let mut wait = deadline - now;
        if i + 1 < samples && !spacing.is_zero() {
            wait = wait.min(spacing);
        }
        if let Some(rtt) = echo(wait) {
            rtts.push(rtt);
        }
    }
    rtts
}

fn probe_error(err: io::Error) -> ProbeError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => ProbeError::PermissionDenied,
        _ => ProbeError::Io(err),
    }
}

fn mean_rtt(samples_ms: &[f64]) -> Option<Duration> {
    if samples_ms.is_empty() {
        return None;
    }
    let mean_ms = samples_ms.iter().sum::<f64>() / samples_ms.len() as f64;
    Some(Duration::from_secs_f64(mean_ms.max(0.0) / 1000.0))
}

fn sleep_until(target: Instant, spin_us: u64) {
    let spin = Duration::from_micros(spin_us);
    loop {
        let now = Instant::now();
        if now >= target {
            break;
        }
        let remaining = target - now;
        if spin_us == 0 || remaining > spin {
            thread::sleep(remaining - spin);
        } else {
            while Instant::now() < target {
                std::hint::spin_loop();
            }
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_samples() {
        assert_eq!(mean_rtt(&[]), None);
        let mean = mean_rtt(&[10.0, 20.0, 30.0]).unwrap();
        assert!((mean.as_secs_f64() - 0.020).abs() < 1e-9);
    }

    #[test]
    fn permission_errors_are_classified() {
        let err = probe_error(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert!(matches!(err, ProbeError::PermissionDenied));
        let err = probe_error(io::Error::new(io::ErrorKind::AddrNotAvailable, "nope"));
        assert!(matches!(err, ProbeError::Io(_)));
    }

    #[test]
    fn lost_echo_does_not_end_sampling() {
        let spacing = Duration::from_millis(5);
        let mut waits = Vec::new();
        let rtts = collect_samples(3, spacing, Duration::from_secs(5), 0, |wait| {
            waits.push(wait);
            match waits.len() {
                1 => {
                    thread::sleep(wait);
                    None
                }
                n => Some(n as f64 * 10.0),
            }
        });
        assert_eq!(rtts, vec![20.0, 30.0]);
        assert_eq!(waits.len(), 3);
        assert!(waits[0] <= spacing);
        assert!(waits[1] <= spacing);
        assert!(waits[2] > spacing);
        let mean = mean_rtt(&rtts).unwrap();
        assert!((mean.as_secs_f64() - 0.025).abs() < 1e-9);
    }

    #[test]
    fn sampling_stops_at_deadline() {
        let mut calls = 0;
        let rtts = collect_samples(5, Duration::from_millis(50), Duration::from_millis(80), 0, |_| {
            calls += 1;
            Some(1.0)
        });
        assert_eq!(calls, 2);
        assert_eq!(rtts.len(), 2);
    }

    #[test]
    fn sleep_until_waits_for_target() {
        let target = Instant::now() + Duration::from_millis(5);
        sleep_until(target, 200);
        assert!(Instant::now() >= target);
    }

    #[test]
    fn unresolvable_host_is_a_resolve_error() {
        let transport = IcmpTransport::new(Duration::ZERO, 0);
        let err = transport
            .measure("no-such-host.invalid", 1, Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, ProbeError::Resolve { .. }));
    }
}
