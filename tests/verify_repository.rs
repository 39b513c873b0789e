//! End-to-end verification over in-memory repositories.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::Signer as _;
use sha2::{Digest, Sha256};

use repoguard::git::encode::commit_signing_payload;
use repoguard::git::{Commit, MemorySource, ObjectId, Person, RepoSource, RepoState, Tree};
use repoguard::verify::{
    local_state, GitCliError, MergeOps, ParsedConfig, RepoConfig, Verifier, VerifyError,
};

const REPO_URI: &str = "git+https://github.com/acme/widget.git";

/// Minimal SSHSIG producer for fixtures: one deterministic ed25519 key.
struct Signer {
    key: ed25519_dalek::SigningKey,
    wire_blob: Vec<u8>,
}

fn push_string(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}

impl Signer {
    fn new(seed: u8) -> Self {
        let key = ed25519_dalek::SigningKey::from_bytes(&[seed; 32]);
        let mut wire_blob = Vec::new();
        push_string(&mut wire_blob, b"ssh-ed25519");
        push_string(&mut wire_blob, key.verifying_key().as_bytes());
        Self { key, wire_blob }
    }

    fn authorized_key(&self) -> String {
        format!("ssh-ed25519 {} fixture@test", BASE64.encode(&self.wire_blob))
    }

    fn sign(&self, content: &[u8]) -> String {
        let content_hash = Sha256::digest(content);

        let mut signed_blob = Vec::new();
        signed_blob.extend_from_slice(b"SSHSIG");
        push_string(&mut signed_blob, b"git");
        push_string(&mut signed_blob, b"");
        push_string(&mut signed_blob, b"sha256");
        push_string(&mut signed_blob, &content_hash);

        let signature = self.key.sign(&signed_blob);
        let mut signature_blob = Vec::new();
        push_string(&mut signature_blob, b"ssh-ed25519");
        push_string(&mut signature_blob, &signature.to_bytes());

        let mut raw = Vec::new();
        raw.extend_from_slice(b"SSHSIG");
        raw.extend_from_slice(&1u32.to_be_bytes());
        push_string(&mut raw, &self.wire_blob);
        push_string(&mut raw, b"git");
        push_string(&mut raw, b"");
        push_string(&mut raw, b"sha256");
        push_string(&mut raw, &signature_blob);

        let encoded = BASE64.encode(&raw);
        let mut pem = String::from("-----BEGIN SSH SIGNATURE-----\n");
        for chunk in encoded.as_bytes().chunks(70) {
            pem.push_str(std::str::from_utf8(chunk).unwrap());
            pem.push('\n');
        }
        pem.push_str("-----END SSH SIGNATURE-----\n");
        pem
    }
}

struct NoMerges;

impl MergeOps for NoMerges {
    fn merge_base(&self, _a: &ObjectId, _b: &ObjectId) -> Result<ObjectId, GitCliError> {
        Err(GitCliError::BadOutput {
            operation: "merge-base",
            output: "unexpected call".into(),
        })
    }

    fn merge_tree(&self, _a: &ObjectId, _b: &ObjectId) -> Result<ObjectId, GitCliError> {
        Err(GitCliError::BadOutput {
            operation: "merge-tree",
            output: "unexpected call".into(),
        })
    }
}

fn person(email: &str) -> Person {
    Person {
        name: "Fixture".into(),
        email: email.into(),
        timestamp: 1_700_000_000,
        tz: "+0000".into(),
    }
}

fn signed_commit(
    source: &mut MemorySource,
    signer: &Signer,
    tree: ObjectId,
    parents: Vec<ObjectId>,
    message: &str,
) -> ObjectId {
    let mut commit = Commit {
        tree,
        parents,
        author: person("m@example.com"),
        committer: person("m@example.com"),
        signature: None,
        message: message.into(),
    };
    commit.signature = Some(signer.sign(&commit_signing_payload(&commit)));
    source.add_commit(&commit)
}

fn unsigned_commit(
    source: &mut MemorySource,
    tree: ObjectId,
    parents: Vec<ObjectId>,
    message: &str,
) -> ObjectId {
    source.add_commit(&Commit {
        tree,
        parents,
        author: person("m@example.com"),
        committer: person("m@example.com"),
        signature: None,
        message: message.into(),
    })
}

fn config(signer: &Signer, repo_extra: &str) -> RepoConfig {
    let text = format!(
        r#"{{
  "_type": "https://supply-chain-tools.github.io/schemas/gitverify/v0.1",
  "identities": [{{"email": "m@example.com", "sshPublicKeys": ["{}"]}}],
  "maintainers": ["m@example.com"],
  "rules": {{
    "allowSshSignatures": true,
    "requireSshUserPresent": false,
    "requireSshUserVerified": false
  }},
  "repositories": [{{"uri": "{REPO_URI}"{repo_extra}}}]
}}"#,
        signer.authorized_key()
    );
    let parsed = ParsedConfig::from_json(&text).unwrap();
    RepoConfig::compile(&parsed, REPO_URI).unwrap()
}

#[test]
fn clean_signed_repository_verifies() {
    let signer = Signer::new(11);
    let mut source = MemorySource::new();
    let tree = source.add_tree(&Tree::default());
    let root = signed_commit(&mut source, &signer, tree, vec![], "root\n");
    let tip = signed_commit(&mut source, &signer, tree, vec![root], "tip\n");
    source.add_ref("refs/remotes/origin/main", tip);
    source.set_head(tip);

    let state = RepoState::load(&source).unwrap();
    let merge = NoMerges;
    let mut verifier =
        Verifier::from_source(&state, &source, config(&signer, ""), &merge).unwrap();
    verifier.verify(None).unwrap();
}

#[test]
fn protected_branch_with_direct_commit_is_malformed() {
    // requireMergeCommits is on by default; a direct (single-parent)
    // commit on top of the after frontier must fail.
    let signer = Signer::new(11);
    let mut source = MemorySource::new();
    let tree = source.add_tree(&Tree::default());
    let frontier = unsigned_commit(&mut source, tree, vec![], "frontier\n");
    let direct = signed_commit(&mut source, &signer, tree, vec![frontier], "direct\n");
    source.add_ref("refs/remotes/origin/main", direct);
    source.set_head(direct);

    let state = RepoState::load(&source).unwrap();
    let merge = NoMerges;
    let extra = format!(
        ", \"after\": [{{\"sha1\": \"{frontier}\", \"branch\": \"main\"}}], \"protectedBranches\": [\"main\"]"
    );
    let mut verifier =
        Verifier::from_source(&state, &source, config(&signer, &extra), &merge).unwrap();

    match verifier.verify(None) {
        Err(VerifyError::ProtectedBranchMalformed { branch, .. }) => assert_eq!(branch, "main"),
        other => panic!("expected ProtectedBranchMalformed, got {other:?}"),
    }
}

#[test]
fn retagged_release_breaks_local_state_continuity() {
    let signer = Signer::new(11);

    // First run: v1.0.0 points at c1.
    let mut before = MemorySource::new();
    let tree = before.add_tree(&Tree::default());
    let c1 = signed_commit(&mut before, &signer, tree, vec![], "one\n");
    let c2 = signed_commit(&mut before, &signer, tree, vec![c1], "two\n");
    before.add_ref("refs/tags/v1.0.0", c1);
    before.set_head(c2);

    let state_before = RepoState::load(&before).unwrap();
    let refs_before = before.references().unwrap();
    let repo_config = config(&signer, "");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("local.json");
    let snapshot = local_state::snapshot(
        &state_before,
        &refs_before,
        &repo_config,
        &local_state::SystemClock,
    )
    .unwrap();
    snapshot.save(&path).unwrap();

    // Second run: same history, tag moved to c2.
    let mut after = MemorySource::new();
    let tree2 = after.add_tree(&Tree::default());
    let d1 = signed_commit(&mut after, &signer, tree2, vec![], "one\n");
    let d2 = signed_commit(&mut after, &signer, tree2, vec![d1], "two\n");
    assert_eq!((d1, d2), (c1, c2));
    after.add_ref("refs/tags/v1.0.0", d2);
    after.set_head(d2);

    let state_after = RepoState::load(&after).unwrap();
    let refs_after = after.references().unwrap();

    let previous = local_state::LocalState::load(&path).unwrap().unwrap();
    match local_state::verify_continuity(&previous, &state_after, &refs_after, &repo_config) {
        Err(VerifyError::TagMutated { ref_name, was, now }) => {
            assert_eq!(ref_name, "refs/tags/v1.0.0");
            assert_eq!(was, c1.to_hex());
            assert_eq!(now, c2.to_hex());
        }
        other => panic!("expected TagMutated, got {other:?}"),
    }
}

#[test]
fn shared_engine_is_usable_across_threads() {
    // The search trie is built once and shared read-only by all workers.
    use repoguard::search::{CharacterClass, MatchMode, Parameters, Search};

    let engine = Arc::new(
        Search::new(
            &["left-pad".to_owned()],
            Parameters::new(MatchMode::NormalizedAndTypo, CharacterClass::Package),
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let input = format!("dep {i} uses leftpad somewhere");
                engine.matches(input.as_bytes()).unwrap().len()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 1);
    }
}
