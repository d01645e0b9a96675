//! End-to-end runs against a directory store, with shell scripts standing in
//! for the alignment tools.
#![cfg(unix)]

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use wga_rs::publish::Report;
use wga_rs::{
    AlignmentResult, AlignmentTool, CallContext, CancelToken, Config, LocalStore, ObjectInfo,
    ObjectStore, ProvenanceAction, RunParams, WgaError, WholeGenomeAligner,
};

const FAKE_MUGSY: &str = r#"#!/bin/sh
echo "$@" > "$PWD/mugsy.args"
dir=""
while [ $# -gt 0 ]; do
  case "$1" in
    --directory) dir="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo "mugsy: aligning genomes"
echo "mugsy: progress on stderr" >&2
cat > "$dir/out.maf" <<'EOF'
##maf version=1 scoring=mugsy
a score=42 label=1 mult=2
s 1.chr 0 8 + 8 ACGT-ACGT
s 2.chr 0 9 + 9 ACGTTACGT

EOF
"#;

const FAKE_MAUVE: &str = r#"#!/bin/sh
echo "$@" > "$PWD/mauve.args"
out=""
for arg in "$@"; do
  case "$arg" in
    --output=*) out="${arg#--output=}" ;;
  esac
done
cat > "$out" <<'EOF'
#FormatVersion Mauve1
#Sequence1File	/x/1.fa
> 1:1-8 + /x/1.fa
ACGT-ACGT
> 2:1-9 + /x/2.fa
ACGTTACGT
=
EOF
printf 'seq0_leftend\tseq0_rightend\tseq1_leftend\tseq1_rightend\n1\t8\t1\t9\n' > "$out.backbone"
"#;

const FAILING_TOOL: &str = "#!/bin/sh\necho 'ERROR: could not read input' >&2\nexit 2\n";

const HANGING_TOOL: &str = "#!/bin/sh\necho started\nexec sleep 60\n";

/// Store wrapper recording every fetched reference and save call.
struct CountingStore {
    inner: LocalStore,
    fetched: RefCell<Vec<String>>,
    saves: RefCell<usize>,
}

impl ObjectStore for CountingStore {
    fn get_objects(&self, references: &[String]) -> wga_rs::Result<Vec<wga_rs::store::ObjectData>> {
        self.fetched.borrow_mut().extend(references.iter().cloned());
        self.inner.get_objects(references)
    }

    fn save_objects(
        &self,
        container_id: u64,
        objects: Vec<wga_rs::store::ObjectSpec>,
    ) -> wga_rs::Result<Vec<ObjectInfo>> {
        *self.saves.borrow_mut() += 1;
        self.inner.save_objects(container_id, objects)
    }
}

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    store: LocalStore,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let store = LocalStore::open(root.join("store")).unwrap();
        Fixture {
            _dir: dir,
            root,
            store,
        }
    }

    fn contig_set(&self, name: &str, seq: &str) -> ObjectInfo {
        self.store
            .put(3, "KBaseGenomes.ContigSet-3.0", name, json!({
                "contigs": [{"id": format!("{name}_chr"), "sequence": seq}]
            }))
            .unwrap()
    }

    fn genome(&self, name: &str, scientific_name: &str, seq: &str) -> ObjectInfo {
        let contigs = self.contig_set(&format!("{name}_contigs"), seq);
        self.store
            .put(3, "KBaseGenomes.Genome-8.2", name, json!({
                "scientific_name": scientific_name,
                "contigset_ref": contigs.reference(),
            }))
            .unwrap()
    }

    fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn aligner(&self, tool: AlignmentTool, binary: &Path) -> WholeGenomeAligner<CountingStore> {
        self.aligner_with(Config::builder().binary(tool, binary))
    }

    fn aligner_with(&self, builder: wga_rs::config::ConfigBuilder) -> WholeGenomeAligner<CountingStore> {
        let config = builder.scratch_dir(self.root.join("scratch")).build();
        let store = CountingStore {
            inner: self.store.clone(),
            fetched: RefCell::new(Vec::new()),
            saves: RefCell::new(0),
        };
        WholeGenomeAligner::new(config, store).unwrap()
    }
}

fn is_full_reference(reference: &str) -> bool {
    let parts: Vec<&str> = reference.split('/').collect();
    parts.len() == 3 && parts.iter().all(|p| p.parse::<u64>().is_ok())
}

fn load(store: &LocalStore, reference: &str) -> Value {
    store.get_objects(&[reference.to_string()]).unwrap()[0].data.clone()
}

#[test]
fn test_mugsy_two_genomes_end_to_end() {
    let fx = Fixture::new();
    let a = fx.contig_set("strain_a", "ACGTACGT");
    let b = fx.contig_set("strain_b", "ACGTTACGT");
    let aligner = fx.aligner(AlignmentTool::Mugsy, &fx.script("mugsy", FAKE_MUGSY));

    let params = RunParams::new("pair_alignment", "my_ws")
        .genome(a.reference())
        .genome(b.reference());
    let output = aligner.run_mugsy(&params, &CallContext::default()).unwrap();

    assert!(is_full_reference(&output.report_ref), "{}", output.report_ref);
    assert!(output.report_name.starts_with("run_mugsy.report.0x"));

    let alignment: AlignmentResult =
        serde_json::from_value(load(&fx.store, "3/pair_alignment")).unwrap();
    assert_eq!(alignment.id, "mugsy.aln");
    assert_eq!(alignment.contigs.len(), 2);
    assert_eq!(alignment.contigs[0].sequence, "ACGT-ACGT");
    assert_eq!(alignment.contigs[1].length, 9);

    let report: Report = serde_json::from_value(load(&fx.store, &output.report_ref)).unwrap();
    let text = &report.text_message;
    let first = text.find("  1: 1 (3)").expect("first genome listed");
    let second = text.find("  2: 2 (3)").expect("second genome listed");
    assert!(first < second);
    assert!(text.contains("============= MAF output ============="));
    assert!(text.lines().all(|l| l.chars().count() <= 83));
    assert_eq!(report.objects_created[0].reference, "my_ws/pair_alignment");

    let args = std::fs::read_to_string(aligner.config().scratch_dir.join("mugsy.args")).unwrap();
    assert!(args.starts_with("-p out --directory "));
    assert!(args.trim_end().ends_with("/2.fa"));
    assert!(!args.contains("--minlength"));
    assert_eq!(*aligner.store().saves.borrow(), 2);
}

#[test]
fn test_mugsy_options_follow_truthiness() {
    let fx = Fixture::new();
    let a = fx.contig_set("a", "ACGT");
    let b = fx.contig_set("b", "ACGT");
    let aligner = fx.aligner(AlignmentTool::Mugsy, &fx.script("mugsy", FAKE_MUGSY));

    let params = RunParams::new("aln", "ws")
        .genome(a.reference())
        .genome(b.reference())
        .option("minlength", 30)
        .option("distance", 0);
    aligner.run_mugsy(&params, &CallContext::default()).unwrap();

    let args = std::fs::read_to_string(aligner.config().scratch_dir.join("mugsy.args")).unwrap();
    assert!(args.contains("--minlength 30"));
    assert!(!args.contains("--distance"));
}

#[test]
fn test_mauve_genome_set_with_provenance() {
    let fx = Fixture::new();
    let g1 = fx.genome("ecoli", "Escherichia coli", "ACGTACGT");
    let g2 = fx.genome("salmonella", "Salmonella enterica", "ACGTTACGT");
    let set = fx
        .store
        .put(3, "KBaseSearch.GenomeSet-2.1", "set", json!({
            "elements": {
                "second": {"ref": g2.reference()},
                "first": {"ref": g1.reference()},
            }
        }))
        .unwrap();
    let aligner = fx.aligner(AlignmentTool::Mauve, &fx.script("progressiveMauve", FAKE_MAUVE));

    let upstream = vec![ProvenanceAction {
        service: Some("narrative".to_string()),
        ..Default::default()
    }];
    let params = RunParams::new("mauve_aln", "ws")
        .genome_set(set.reference())
        .option("hmm_identity", 0.8);
    let output = aligner
        .run_mauve(&params, &CallContext { provenance: Some(upstream) })
        .unwrap();

    // Each Genome is dereferenced through its contig set exactly once
    let fetched = aligner.store().fetched.borrow().clone();
    assert_eq!(fetched.len(), 5);
    assert_eq!(fetched[0], set.reference());
    assert_eq!(fetched[1], g2.reference());
    assert_eq!(fetched[3], g1.reference());

    let alignment: AlignmentResult = serde_json::from_value(load(&fx.store, "3/mauve_aln")).unwrap();
    assert_eq!(alignment.id, "mauve.aln");
    assert_eq!(alignment.contigs.len(), 2);
    assert_eq!(alignment.contigs[0].id, "1:1-8");

    let report: Report = serde_json::from_value(load(&fx.store, &output.report_ref)).unwrap();
    assert!(report.text_message.contains(&format!("  1: Salmonella enterica ({})", g2.reference())));
    assert!(report.text_message.contains(&format!("  2: Escherichia coli ({})", g1.reference())));
    assert!(report.text_message.contains("XMFA.backbone output"));

    let provenance = fx.store.provenance("3/mauve_aln").unwrap();
    assert_eq!(provenance[0].service.as_deref(), Some("narrative"));
    assert_eq!(provenance[0].input_ws_objects, vec![set.reference()]);
    assert_eq!(
        provenance[0].description.as_deref(),
        Some("whole genome alignment using mauve")
    );

    let args = std::fs::read_to_string(aligner.config().scratch_dir.join("mauve.args")).unwrap();
    assert!(args.starts_with("--output="));
    assert!(args.contains("--hmm-identity 0.8"));
}

#[test]
fn test_contig_sets_are_not_dereferenced() {
    let fx = Fixture::new();
    let a = fx.contig_set("a", "ACGT");
    let b = fx.contig_set("b", "ACGT");
    let aligner = fx.aligner(AlignmentTool::Mugsy, &fx.script("mugsy", FAKE_MUGSY));

    let params = RunParams::new("aln", "ws").genome(a.reference()).genome(b.reference());
    aligner.run_mugsy(&params, &CallContext::default()).unwrap();

    assert_eq!(*aligner.store().fetched.borrow(), vec![a.reference(), b.reference()]);
}

#[test]
fn test_tool_failure_persists_nothing() {
    let fx = Fixture::new();
    let a = fx.contig_set("a", "ACGT");
    let b = fx.contig_set("b", "ACGT");
    let aligner = fx.aligner(AlignmentTool::Mugsy, &fx.script("mugsy", FAILING_TOOL));

    let params = RunParams::new("aln", "ws").genome(a.reference()).genome(b.reference());
    let err = aligner.run_mugsy(&params, &CallContext::default()).unwrap_err();

    match err {
        WgaError::ToolExecution { exit_code, output, .. } => {
            assert_eq!(exit_code, 2);
            assert!(output.contains("could not read input"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(*aligner.store().saves.borrow(), 0);
    assert!(fx.store.get_objects(&["3/aln".to_string()]).is_err());
}

#[test]
fn test_eleven_genomes_rejected_before_any_work() {
    let fx = Fixture::new();
    let marker = fx.root.join("ran");
    let tool = fx.script("mugsy", &format!("#!/bin/sh\ntouch {}\n", marker.display()));
    let aligner = fx.aligner(AlignmentTool::Mugsy, &tool);

    let mut params = RunParams::new("aln", "ws");
    for i in 0..11 {
        params = params.genome(format!("3/{i}"));
    }
    let err = aligner.run_mugsy(&params, &CallContext::default()).unwrap_err();

    assert!(matches!(err, WgaError::Validation(_)), "{err}");
    assert!(aligner.store().fetched.borrow().is_empty());
    assert!(!marker.exists());
}

#[test]
fn test_single_genome_rejected() {
    let fx = Fixture::new();
    let a = fx.contig_set("a", "ACGT");
    let aligner = fx.aligner(AlignmentTool::Mauve, &fx.script("progressiveMauve", FAKE_MAUVE));

    let params = RunParams::new("aln", "ws").genome(a.reference());
    let err = aligner.run_mauve(&params, &CallContext::default()).unwrap_err();
    assert!(matches!(err, WgaError::Validation(_)));
}

#[test]
fn test_hanging_tool_times_out() {
    let fx = Fixture::new();
    let a = fx.contig_set("a", "ACGT");
    let b = fx.contig_set("b", "ACGT");
    let tool = fx.script("mugsy", HANGING_TOOL);
    let aligner = fx.aligner_with(
        Config::builder()
            .binary(AlignmentTool::Mugsy, &tool)
            .tool_timeout(Duration::from_millis(500)),
    );

    let params = RunParams::new("aln", "ws").genome(a.reference()).genome(b.reference());
    let err = aligner.run_mugsy(&params, &CallContext::default()).unwrap_err();
    assert!(matches!(err, WgaError::Timeout { .. }), "{err}");
    assert_eq!(*aligner.store().saves.borrow(), 0);
}

#[test]
fn test_cancelled_run_does_not_poison_later_runs() {
    let fx = Fixture::new();
    let a = fx.contig_set("a", "ACGTACGT");
    let b = fx.contig_set("b", "ACGTTACGT");
    let aligner = fx.aligner(AlignmentTool::Mugsy, &fx.script("mugsy", FAKE_MUGSY));
    let params = RunParams::new("aln", "ws").genome(a.reference()).genome(b.reference());

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let mut sink = move |_: AlignmentTool, _: &str| trigger.cancel();
    let err = aligner
        .run_with_sink(AlignmentTool::Mugsy, &params, &CallContext::default(), &mut sink, &cancel)
        .unwrap_err();
    assert!(matches!(err, WgaError::Cancelled), "{err}");
    assert_eq!(*aligner.store().saves.borrow(), 0);

    let output = aligner.run_mugsy(&params, &CallContext::default()).unwrap();
    assert!(is_full_reference(&output.report_ref), "{}", output.report_ref);
    assert_eq!(*aligner.store().saves.borrow(), 2);
}
