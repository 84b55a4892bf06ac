//! Prints the JSON schema of the bootstrap policy document.
//!
//! Usage: `policy-schema > policy.schema.json`

use cluster_policy::PolicyDocument;

fn main() -> Result<(), serde_json::Error> {
    let schema = schemars::schema_for!(PolicyDocument);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
