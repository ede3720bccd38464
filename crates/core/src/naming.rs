//! Artifact naming (C3): zKey indices, filenames, storage paths, bucket
//! names.

/// Decimal, left-padded to width 5 with `0`.
pub fn format_zkey_index(n: u32) -> String {
    format!("{:05}", n)
}

/// `{circuitPrefix}_{formatZkeyIndex(completedContributions)}.zkey`.
pub fn last_zkey_name(circuit_prefix: &str, completed_contributions: u32) -> String {
    format!("{}_{}.zkey", circuit_prefix, format_zkey_index(completed_contributions))
}

/// `{circuitPrefix}_{formatZkeyIndex(completedContributions+1)}.zkey`.
pub fn next_zkey_name(circuit_prefix: &str, completed_contributions: u32) -> String {
    format!(
        "{}_{}.zkey",
        circuit_prefix,
        format_zkey_index(completed_contributions + 1)
    )
}

/// `circuits/{circuitPrefix}/contributions/{filename}`.
pub fn storage_path(circuit_prefix: &str, filename: &str) -> String {
    format!("circuits/{}/contributions/{}", circuit_prefix, filename)
}

/// `{ceremonyPrefix}{bucketPostfix}`.
pub fn bucket_name(ceremony_prefix: &str, bucket_postfix: &str) -> String {
    format!("{}{}", ceremony_prefix, bucket_postfix)
}
