//! Shell command composition for timezone changes.
//!
//! Builds a single conditional batch that applies a timezone across
//! heterogeneous hosts without knowing in advance which tools are installed:
//! systemd's `timedatectl` when available, otherwise the legacy
//! `/etc/timezone` + `/etc/localtime` convention, otherwise the symlink
//! alone. Reconciliation of the tzdata package and the time daemon restart
//! are best-effort and never fail the batch.
//!
//! Every interpolated identifier is shell-escaped. Callers must still only
//! pass validated [`Timezone`] values; the composer does not re-validate.

use crate::types::Timezone;
use shell_escape::escape;
use std::borrow::Cow;

/// One branch of a first-match-wins fallback chain: a shell precondition and
/// the actions to run when it holds.
struct FallbackStep {
    precondition: String,
    actions: Vec<String>,
}

/// Render an ordered fallback chain as a single `if/elif/else/fi` block.
fn render_chain(steps: &[FallbackStep], else_actions: &[String]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, step) in steps.iter().enumerate() {
        let keyword = if i == 0 { "if" } else { "elif" };
        lines.push(format!("{} {}; then", keyword, step.precondition));
        for action in &step.actions {
            lines.push(format!("    {}", action));
        }
    }
    if !else_actions.is_empty() {
        lines.push("else".to_string());
        for action in else_actions {
            lines.push(format!("    {}", action));
        }
    }
    lines.push("fi".to_string());
    lines
}

fn quote(value: &str) -> String {
    escape(Cow::from(value)).into_owned()
}

/// Compose the apply batch for a desired timezone.
///
/// The batch is order-significant and meant to run as one `sh` script:
/// 1. set the timezone via the first applicable OS mechanism (fatal if none),
/// 2. reconcile the tzdata package / legacy clock file (optional, non-fatal),
/// 3. restart the time synchronization daemon (best-effort, `|| true`).
pub fn compose_apply(timezone: &Timezone) -> Vec<String> {
    let tz = quote(timezone.as_str());

    let set_chain = [
        FallbackStep {
            precondition: "command -v timedatectl > /dev/null 2>&1 && pidof systemd > /dev/null"
                .to_string(),
            actions: vec![format!("timedatectl set-timezone {tz}")],
        },
        FallbackStep {
            precondition: "[ -f /etc/timezone ]".to_string(),
            actions: vec![
                format!("printf '%s\\n' {tz} > /etc/timezone"),
                "rm -f /etc/localtime".to_string(),
                format!("ln -sf /usr/share/zoneinfo/{tz} /etc/localtime"),
            ],
        },
        FallbackStep {
            precondition: "[ -f /etc/localtime ]".to_string(),
            actions: vec![
                "rm -f /etc/localtime".to_string(),
                format!("ln -sf /usr/share/zoneinfo/{tz} /etc/localtime"),
            ],
        },
    ];
    let set_fatal = [
        "echo 'Unable to set timezone' >&2".to_string(),
        "exit 1".to_string(),
    ];

    // The sed expression is built host-side and passed as one quoted argument.
    // Valid IANA identifiers contain no '|', so it is a safe delimiter.
    let sed_expr = quote(&format!(
        "s|^ZONE=.*|ZONE=\"{}\"|",
        timezone.as_str()
    ));
    let reconcile_chain = [
        FallbackStep {
            precondition: "command -v dpkg-reconfigure > /dev/null 2>&1".to_string(),
            actions: vec!["dpkg-reconfigure -f noninteractive tzdata".to_string()],
        },
        FallbackStep {
            precondition: "command -v tzdata-update > /dev/null 2>&1".to_string(),
            actions: vec!["tzdata-update".to_string()],
        },
        FallbackStep {
            precondition: "[ -f /etc/sysconfig/clock ]".to_string(),
            actions: vec![format!("sed -i {sed_expr} /etc/sysconfig/clock")],
        },
    ];

    let daemon_chain = [
        FallbackStep {
            precondition: "command -v systemctl > /dev/null 2>&1 && pidof systemd > /dev/null"
                .to_string(),
            actions: vec!["systemctl try-restart systemd-timesyncd.service || true".to_string()],
        },
        FallbackStep {
            precondition: "command -v service > /dev/null 2>&1".to_string(),
            actions: vec!["service ntpd restart || service ntp restart || true".to_string()],
        },
    ];

    let mut commands = render_chain(&set_chain, &set_fatal);
    commands.extend(render_chain(&reconcile_chain, &[]));
    commands.extend(render_chain(&daemon_chain, &[]));
    commands
}

/// Compose the read-only verification probe.
///
/// Line 1 of its output is `<abbreviation> <±HH:MM>` for the host's current
/// time; line 2 is the identifier `/etc/localtime` resolves to. The probe is
/// independent from the apply batch and observes post-change state only.
pub fn compose_probe() -> Vec<String> {
    vec![
        "date +'%Z %:z'".to_string(),
        "readlink /etc/localtime | sed 's#/usr/share/zoneinfo/##'".to_string(),
    ]
}

/// Join a batch into the single script handed to the remote shell.
pub fn join_batch(commands: &[String]) -> String {
    commands.join("\n")
}
