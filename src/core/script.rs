//! Script wrapping for the remote audit trail.
//!
//! Every generated script is written verbatim to a uniquely named file in a
//! per-run-as-user control directory, executed via a subshell with combined
//! stdout/stderr duplicated to a companion `.output` file, and pruned so the
//! directory never holds more than [RETAINED_SCRIPT_PAIRS] pairs.

use chrono::{DateTime, Utc};

/// Script/output pairs kept per control directory after each run.
pub const RETAINED_SCRIPT_PAIRS: usize = 50;

/// Unique base name for one job instance's script and output files.
///
/// Wall-clock seconds plus the nanosecond remainder guarantees uniqueness
/// within the same second.
pub fn unique_script_name(now: DateTime<Utc>) -> String {
    format!(
        "provision-{}_{}",
        now.timestamp(),
        now.timestamp_subsec_nanos()
    )
}

/// Control directory for scripts executed as the given user.
pub fn control_dir_for(user: &str) -> String {
    if user == "root" {
        "/root/.dockhand-scripts".to_string()
    } else {
        format!("/home/{}/.dockhand-scripts", user)
    }
}

/// Heredoc delimiter for one wrapped script, derived from its unique name
/// and extended until it does not occur in the payload, so the archived
/// script can never be truncated by a delimiter lookalike.
fn delimiter_for(name: &str, payload: &str) -> String {
    let mut delimiter = format!("__DOCKHAND_{}__", name);
    while payload.contains(&delimiter) {
        delimiter.push('_');
    }
    delimiter
}

/// Wrap a raw script for audited execution.
///
/// The wrapper captures the inner script's exit code via `PIPESTATUS`, not
/// the `tee` duplication, and returns it as its own exit code.
pub fn wrap_script(raw: &str, control_dir: &str, name: &str) -> String {
    let script_path = format!("{}/{}.sh", control_dir, name);
    let output_path = format!("{}/{}.output", control_dir, name);

    // Newline-terminate the payload so the heredoc delimiter lands on its
    // own line even for scripts missing a trailing newline.
    let payload = if raw.ends_with('\n') {
        raw.to_string()
    } else {
        format!("{}\n", raw)
    };
    let delimiter = delimiter_for(name, &payload);

    format!(
        "mkdir -p '{dir}'\n\
         cat > '{script}' << '{delim}'\n\
         {payload}\
         {delim}\n\
         chmod 700 '{script}'\n\
         ( bash '{script}' ) 2>&1 | tee '{output}'\n\
         __dockhand_exit=${{PIPESTATUS[0]}}\n\
         ls -1t '{dir}'/provision-*.sh 2>/dev/null | tail -n +{keep_plus_one} | \
         while read -r __old; do rm -f \"$__old\" \"${{__old%.sh}}.output\"; done\n\
         exit $__dockhand_exit\n",
        dir = control_dir,
        script = script_path,
        output = output_path,
        payload = payload,
        delim = delimiter,
        keep_plus_one = RETAINED_SCRIPT_PAIRS + 1,
    )
}
