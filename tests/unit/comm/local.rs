use super::*;
use crate::comm::communicator::ReduceTarget;

fn leftmost_nonzero(input: &[u8], inout: &mut [u8]) {
    for (a, b) in input.iter().zip(inout.iter_mut()) {
        if *a != 0 {
            *b = *a;
        }
    }
}

#[test]
fn zero_ranks_is_a_config_error() {
    assert!(matches!(
        LocalGroup::endpoints(0),
        Err(SortLastError::Config(_))
    ));
}

#[test]
fn messages_between_a_pair_arrive_in_order() {
    let out = LocalGroup::run(2, |comm| {
        if comm.rank() == 0 {
            for i in 0..5u8 {
                comm.send(1, 7, &[i]).unwrap();
            }
            Vec::new()
        } else {
            (0..5).map(|_| comm.recv(0, 7).unwrap()[0]).collect()
        }
    })
    .unwrap();
    assert_eq!(out[1], vec![0, 1, 2, 3, 4]);
}

#[test]
fn receive_matches_tag_and_parks_the_rest() {
    let eps = LocalGroup::endpoints(2).unwrap();
    eps[0].send(1, 1, b"first").unwrap();
    eps[0].send(1, 2, b"second").unwrap();
    eps[0].send(1, 1, b"third").unwrap();

    assert_eq!(eps[1].recv(0, 2).unwrap(), b"second");
    assert_eq!(eps[1].recv(0, 1).unwrap(), b"first");
    assert_eq!(eps[1].recv(0, 1).unwrap(), b"third");
}

#[test]
fn nonblocking_receive_completes_once() {
    let eps = LocalGroup::endpoints(2).unwrap();
    let mut req = eps[1].irecv(0, 9);
    assert_eq!(req.test().unwrap(), None);
    eps[0].send(1, 9, b"hi").unwrap();
    assert_eq!(req.test().unwrap().as_deref(), Some(&b"hi"[..]));
    assert_eq!(req.test().unwrap(), None);
}

#[test]
fn dropped_peer_is_reported_instead_of_hanging() {
    let mut eps = LocalGroup::endpoints(2).unwrap();
    let gone = eps.remove(0);
    drop(gone);
    assert!(matches!(eps[0].recv(0, 1), Err(SortLastError::Transport(_))));
    assert!(matches!(eps[0].send(0, 1, b"x"), Err(SortLastError::Transport(_))));
}

#[test]
fn out_of_range_peer_is_a_config_error() {
    let eps = LocalGroup::endpoints(1).unwrap();
    assert!(matches!(eps[0].send(3, 0, b""), Err(SortLastError::Config(_))));
}

#[test]
fn default_broadcast_reaches_every_rank() {
    let out = LocalGroup::run(5, |comm| {
        let mut buf = if comm.rank() == 3 { *b"abcd" } else { [0u8; 4] };
        comm.broadcast(3, &mut buf).unwrap();
        buf
    })
    .unwrap();
    assert!(out.iter().all(|b| b == b"abcd"));
}

#[test]
fn reduce_combines_in_rank_order() {
    for size in [1usize, 2, 3, 5, 8] {
        for root in 0..size {
            let out = LocalGroup::run(size, |comm| {
                let r = comm.rank();
                // Position p carries a marker from every rank >= p.
                let send: Vec<u8> = (0..size)
                    .map(|p| if r >= p { r as u8 + 1 } else { 0 })
                    .collect();
                let mut recv = vec![0u8; size];
                let target = ReduceTarget::Root(root);
                let out = (r == root).then_some(&mut recv[..]);
                comm.reduce_records(&send, out, 1, target, &mut leftmost_nonzero)
                    .unwrap();
                recv
            })
            .unwrap();
            let expect: Vec<u8> = (0..size).map(|p| p as u8 + 1).collect();
            assert_eq!(out[root], expect, "size {size} root {root}");
        }
    }
}

#[test]
fn all_reduce_delivers_everywhere() {
    let out = LocalGroup::run(6, |comm| {
        let send = [comm.rank() as u8 + 1, 0];
        let mut recv = [0u8; 2];
        comm.reduce_records(
            &send,
            Some(&mut recv),
            2,
            ReduceTarget::All,
            &mut leftmost_nonzero,
        )
        .unwrap();
        recv
    })
    .unwrap();
    assert!(out.iter().all(|r| *r == [1, 0]));
}

#[test]
fn reduce_rejects_partial_records() {
    let eps = LocalGroup::endpoints(1).unwrap();
    let mut out = [0u8; 3];
    let err = eps[0]
        .reduce_records(
            &[1, 2, 3],
            Some(&mut out),
            2,
            ReduceTarget::Root(0),
            &mut leftmost_nonzero,
        )
        .unwrap_err();
    assert!(matches!(err, SortLastError::Validation(_)));
}

#[test]
fn receiving_root_without_buffer_is_a_config_error() {
    let eps = LocalGroup::endpoints(1).unwrap();
    let err = eps[0]
        .reduce_records(&[1], None, 1, ReduceTarget::Root(0), &mut leftmost_nonzero)
        .unwrap_err();
    assert!(matches!(err, SortLastError::Config(_)));
}
