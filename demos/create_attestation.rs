//! Example: Attesting a container image and checking the attestation
//!
//! Run with: cargo run --example create_attestation

use image_attestation::{
    generate_key_pair, AttestationAuthority, Attestor, CanonicalStatement, Fetcher,
    MemoryFetcher, SigningDefaults, SigningSecret,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("🔏 Image Attestation - Example Usage\n");
    println!("==============================================\n");

    let image = "gcr.io/my-project/web-frontend@sha256:\
                 3f1a2c9e5b7d4f60812ab3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d5e6f708";

    // Step 1: Generate the authority key (in production, this lives in a cluster secret)
    println!("1️⃣  Generating authority signing key...");
    let keys = generate_key_pair("qa-approver", &SigningDefaults::STANDARD)?;
    let key_id = keys.key_pair()?.key_id().unwrap_or_default();
    println!("   ✓ Key id: {}\n", key_id);

    // Step 2: Build the canonical statement for the image
    println!("2️⃣  Building canonical statement...");
    let statement = CanonicalStatement::build(image, [("build", "1234")])?;
    println!("   {}", String::from_utf8_lossy(&statement.to_bytes()?));
    println!("   ✓ Fingerprint: {}\n", statement.fingerprint()?);

    // Step 3: Sign
    println!("3️⃣  Signing attestation...");
    let attestor = Attestor::default();
    let signature = attestor.create_attestation(image, [("build", "1234")], &keys.key_pair()?)?;
    println!("   ✓ Signature: {} base64 characters\n", signature.as_str().len());

    // Step 4: Verify against an independently rebuilt statement
    println!("4️⃣  Verifying attestation...");
    match attestor.verify_attestation(image, [("build", "1234")], &keys.public_key, &signature) {
        Ok(()) => println!("   ✅ Attestation VALID\n"),
        Err(e) => println!("   ❌ Attestation INVALID: {}\n", e),
    }

    // Step 5: A different image must not verify with the same signature
    println!("5️⃣  Checking the signature does not transfer to another image...");
    let other = "gcr.io/my-project/web-frontend@sha256:\
                 0000000000000000000000000000000000000000000000000000000000000000";
    match attestor.verify_attestation(other, [("build", "1234")], &keys.public_key, &signature) {
        Ok(()) => println!("   ❌ Unexpectedly VALID\n"),
        Err(e) => println!("   ✅ Rejected ({}): {}\n", e.kind(), e),
    }

    // Step 6: Record the attestation in a metadata store
    println!("6️⃣  Storing attestation in the metadata store...");
    let fetcher = MemoryFetcher::new(attestor);
    let authority = AttestationAuthority {
        name: "qa-approved".to_string(),
        note_reference: "projects/my-project".to_string(),
        public_key_data: keys.public_key.clone(),
    };
    let note = fetcher.create_attestation_note(&authority).await?;
    let secret = SigningSecret::new("qa-approver", keys);
    let occurrence = fetcher
        .create_attestation_occurrence(&note, image, &secret)
        .await?;
    println!("   ✓ Note: {}", note.name);
    println!("   ✓ Occurrence: {}\n", occurrence.name);

    // Step 7: Admission-time check
    println!("7️⃣  Simulating admission check...");
    let stored = fetcher.attestations(image).await?;
    let accepted = attestor.verify_any(image, &authority.public_key_data, &stored)?;
    println!("   ✅ Image admitted on occurrence {}\n", accepted.occurrence_id);

    println!("==============================================");
    println!("✅ Attestation workflow complete!");
    Ok(())
}
