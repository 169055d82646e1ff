mod common;

use std::fs;

use common::{answer_ruok, fake_java, quick_timeouts};
use nix::sys::signal;
use nix::unistd::Pid;
use zk_shepherd::{Ensemble, Server};

/// Script for members that should come up and stay up.
const WELL_BEHAVED: &str = "exec sleep 30";

/// Script that records its pid, then fails only for the member whose
/// identity file says 1; the config path is the last argument, and myid
/// lives next to it.
const SECOND_MEMBER_FAILS: &str = "for last in \"$@\"; do :; done\n\
d=$(dirname \"$last\")\n\
echo $$ > \"$d/launched-pid\"\n\
if [ \"$(cat \"$d/data/myid\")\" = \"1\" ]; then exit 1; fi\n\
exec sleep 30";

fn ensemble_at(
    dir: &tempfile::TempDir,
    script: &str,
    num_members: usize,
    base_port: u16,
) -> Ensemble {
    let install = fake_java(dir.path(), script);
    let mut ensemble = Ensemble::new(num_members, install);
    ensemble.base_dir = dir.path().join("ensemble");
    ensemble.base_port = base_port;
    ensemble.timeouts = quick_timeouts();
    ensemble
}

#[test]
fn three_members_come_up_with_strided_ports() {
    let dir = tempfile::tempdir().unwrap();
    let responders: Vec<_> = (24811..=24813).map(answer_ruok).collect();
    let mut ensemble = ensemble_at(&dir, WELL_BEHAVED, 3, 24811);

    assert!(ensemble.run().unwrap());
    assert!(ensemble.running());
    assert!(ensemble.all_running());
    assert!(ensemble.ping_all());
    assert_eq!(ensemble.members().len(), 3);

    // Identities and layout
    for (idx, member) in ensemble.members().iter().enumerate() {
        let config = member.config();
        assert_eq!(config.client_port, 24811 + idx as u16);
        assert_eq!(
            fs::read_to_string(config.myid_path()).unwrap(),
            format!("{}\n", idx)
        );
        assert!(config
            .base_dir
            .ends_with(format!("server-{}", idx)));
    }

    // Every rendered config carries the same peer rows.
    for member in ensemble.members() {
        let zoo_cfg = fs::read_to_string(member.config().zoo_cfg_path()).unwrap();
        assert!(zoo_cfg.contains("server.0=127.0.0.1:24911:25011"));
        assert!(zoo_cfg.contains("server.1=127.0.0.1:24912:25012"));
        assert!(zoo_cfg.contains("server.2=127.0.0.1:24913:25013"));
    }

    // A second run is a no-op while everything is up.
    assert!(!ensemble.run().unwrap());

    assert!(ensemble.shutdown());
    assert!(!ensemble.running());
    assert!(!ensemble.all_running());
    assert!(ensemble.members().is_empty(), "shutdown discards the member set");
    assert!(!ensemble.shutdown(), "everything is already down");

    drop(responders);
}

#[test]
fn one_bad_member_rolls_the_whole_ensemble_back() {
    let dir = tempfile::tempdir().unwrap();
    let mut ensemble = ensemble_at(&dir, SECOND_MEMBER_FAILS, 3, 25811);

    let err = ensemble.run().unwrap_err();
    assert!(
        err.to_string().contains("died before answering"),
        "unexpected error: {}",
        err
    );

    assert!(!ensemble.running());
    assert!(
        ensemble.members().is_empty(),
        "a failed launch discards the member set"
    );

    // Member 0 got far enough to be laid out and launched before the
    // rollback, and the rollback actually stopped it.
    assert!(ensemble.base_dir.join("server-0").join("zoo.cfg").is_file());
    assert!(ensemble.base_dir.join("server-1").join("zoo.cfg").is_file());

    let pid: i32 = fs::read_to_string(ensemble.base_dir.join("server-0").join("launched-pid"))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(
        signal::kill(Pid::from_raw(pid), None).is_err(),
        "member 0 (pid {}) should be gone after the rollback",
        pid
    );
}

#[test]
fn clobber_erases_the_tree_and_allows_a_fresh_run() {
    let dir = tempfile::tempdir().unwrap();
    let responders: Vec<_> = (26811..=26812).map(answer_ruok).collect();
    let mut ensemble = ensemble_at(&dir, WELL_BEHAVED, 2, 26811);

    assert!(ensemble.run().unwrap());
    ensemble.clobber().unwrap();
    assert!(!ensemble.base_dir.exists());
    assert!(ensemble.members().is_empty());
    assert!(!ensemble.running());

    // With the member set discarded the ensemble can go again.
    assert!(ensemble.run().unwrap());
    assert!(ensemble.all_running());
    ensemble.shutdown();

    drop(responders);
}

#[test]
fn a_shut_down_ensemble_relaunches_with_fresh_members() {
    let dir = tempfile::tempdir().unwrap();
    let responder = answer_ruok(27811);
    let mut ensemble = ensemble_at(&dir, WELL_BEHAVED, 1, 27811);

    assert!(ensemble.run().unwrap());
    assert!(ensemble.shutdown());

    // Shutdown discarded the single-shot handles, so running again
    // builds fresh ones over the same directories.
    assert!(ensemble.run().unwrap());
    assert!(ensemble.all_running());
    assert!(ensemble.shutdown());

    drop(responder);
}
