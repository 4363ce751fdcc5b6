// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::io::{self, Read, Write};

use bytes::{BufMut, BytesMut};
use sha3::{Digest, Sha3_256};

use crate::bls::PublicKey;
use crate::ledger::{Candidate, Hash, Seed};
use crate::{encoding, Serializable};

/// Wire topics routed by the event bus.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Topics {
    Score = 16,
    Candidate = 17,
    GetCandidate = 18,
    BlockReduction = 19,
    SigSetReduction = 20,
    BlockAgreement = 21,
    SigSetAgreement = 22,
    Quit = 23,

    #[default]
    Unknown = 255,
}

impl From<u8> for Topics {
    fn from(v: u8) -> Self {
        match v {
            16 => Topics::Score,
            17 => Topics::Candidate,
            18 => Topics::GetCandidate,
            19 => Topics::BlockReduction,
            20 => Topics::SigSetReduction,
            21 => Topics::BlockAgreement,
            22 => Topics::SigSetAgreement,
            23 => Topics::Quit,
            _ => Topics::Unknown,
        }
    }
}

impl From<Topics> for u8 {
    fn from(t: Topics) -> Self {
        t as u8
    }
}

/// Position of an event against the currently executed (round, step).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Past,
    Present,
    Future,
}

/// Builds the payload a committee member signs when casting a vote:
/// `votedHash || round || step`.
pub fn marshal_signable_vote(
    voted_hash: &Hash,
    round: u64,
    step: u8,
) -> BytesMut {
    let mut msg = BytesMut::with_capacity(voted_hash.len() + 8 + 1);
    msg.put(&voted_hash[..]);
    msg.put_u64_le(round);
    msg.put_u8(step);

    msg
}

/// Builds the payload a block generator signs with its Ed25519 key: the
/// canonical score-event encoding up to and including the public key.
pub fn marshal_signable_score(
    round: u64,
    step: u8,
    p: &payload::Score,
) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&round.to_le_bytes());
    buf.push(step);
    buf.extend_from_slice(&p.score[..]);
    encoding::write_var_bytes(&mut buf, &p.proof)?;
    buf.extend_from_slice(&p.z[..]);
    buf.extend_from_slice(&p.seed.inner()[..]);
    encoding::write_var_bytes(&mut buf, &p.bid_list_subset)?;
    buf.extend_from_slice(&p.vote_hash[..]);
    buf.extend_from_slice(&p.pubkey_ed25519[..]);

    Ok(buf)
}

/// A single vote as carried inside vote sets and certificates. Serialized
/// as the full event: `EventHeader || payload`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepVote<P> {
    pub round: u64,
    pub step: u8,
    pub pubkey_bls: PublicKey,
    pub payload: P,
}

impl<P: Serializable> Serializable for StepVote<P> {
    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.round.to_le_bytes())?;
        w.write_all(&[self.step])?;
        self.pubkey_bls.write(w)?;
        self.payload.write(w)?;

        Ok(())
    }

    fn read<R: Read>(r: &mut R) -> io::Result<Self>
    where
        Self: Sized,
    {
        let round = Self::read_u64_le(r)?;
        let step = Self::read_u8(r)?;
        let pubkey_bls = PublicKey::read(r)?;
        let payload = P::read(r)?;

        Ok(StepVote {
            round,
            step,
            pubkey_bls,
            payload,
        })
    }
}

/// Marshals a vote set as `VarInt(n) || ev_0 || … || ev_{n-1}`.
pub fn write_vote_set<W: Write, P: Serializable>(
    w: &mut W,
    votes: &[StepVote<P>],
) -> io::Result<()> {
    encoding::write_varint(w, votes.len() as u64)?;
    for vote in votes {
        vote.write(w)?;
    }

    Ok(())
}

pub fn read_vote_set<R: Read, P: Serializable>(
    r: &mut R,
) -> io::Result<Vec<StepVote<P>>> {
    let len = encoding::read_varint(r)?;

    (0..len).map(|_| StepVote::read(r)).collect()
}

/// Digest of a marshalled vote set. This is the "signature set hash" the
/// sigset reduction votes on.
pub fn vote_set_hash<P: Serializable>(votes: &[StepVote<P>]) -> Hash {
    let mut buf = Vec::new();
    if write_vote_set(&mut buf, votes).is_err() {
        return [0u8; 32];
    }

    let mut hasher = Sha3_256::new();
    hasher.update(&buf);
    hasher.finalize().into()
}

/// Message is a data unit that consensus phases can process.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub payload: Payload,
}

impl Serializable for Message {
    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&[self.header.topic])?;

        match &self.payload {
            Payload::Score(p) => {
                w.write_all(&self.header.round.to_le_bytes())?;
                w.write_all(&[self.header.step])?;
                p.write(w)
            }
            Payload::Reduction(p) => {
                self.header.write(w)?;
                p.write(w)
            }
            Payload::SigSet(p) => {
                self.header.write(w)?;
                p.write(w)
            }
            Payload::BlockAgreement(p) => {
                self.header.write(w)?;
                p.write(w)
            }
            Payload::SigSetAgreement(p) => {
                self.header.write(w)?;
                p.write(w)
            }
            Payload::Candidate(p) => p.write(w),
            Payload::GetCandidate(p) => p.write(w),
            // Internal messages are never sent on the wire.
            _ => Ok(()),
        }
    }

    fn read<R: Read>(r: &mut R) -> io::Result<Self>
    where
        Self: Sized,
    {
        let topic = Topics::from(Self::read_u8(r)?);

        let mut header = Header {
            topic: topic as u8,
            ..Default::default()
        };

        let payload = match topic {
            Topics::Score => {
                header.round = Self::read_u64_le(r)?;
                header.step = Self::read_u8(r)?;
                Payload::Score(payload::Score::read(r)?)
            }
            Topics::BlockReduction => {
                header.read_event_fields(r)?;
                Payload::Reduction(payload::Reduction::read(r)?)
            }
            Topics::SigSetReduction => {
                header.read_event_fields(r)?;
                Payload::SigSet(payload::SigSet::read(r)?)
            }
            Topics::BlockAgreement => {
                header.read_event_fields(r)?;
                Payload::BlockAgreement(payload::BlockAgreement::read(r)?)
            }
            Topics::SigSetAgreement => {
                header.read_event_fields(r)?;
                Payload::SigSetAgreement(payload::SigSetAgreement::read(r)?)
            }
            Topics::Candidate => {
                Payload::Candidate(Box::new(Candidate::read(r)?))
            }
            Topics::GetCandidate => {
                Payload::GetCandidate(payload::GetCandidate::read(r)?)
            }
            Topics::Quit => Payload::Empty,
            Topics::Unknown => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "unknown topic",
                ))
            }
        };

        Ok(Message { header, payload })
    }
}

impl Message {
    pub fn empty() -> Message {
        Message::default()
    }

    pub fn new_score(mut header: Header, p: payload::Score) -> Message {
        header.topic = Topics::Score as u8;
        Message {
            header,
            payload: Payload::Score(p),
        }
    }

    pub fn new_reduction(
        mut header: Header,
        payload: payload::Reduction,
    ) -> Message {
        header.topic = Topics::BlockReduction as u8;
        Message {
            header,
            payload: Payload::Reduction(payload),
        }
    }

    pub fn new_sig_set(mut header: Header, payload: payload::SigSet) -> Message {
        header.topic = Topics::SigSetReduction as u8;
        Message {
            header,
            payload: Payload::SigSet(payload),
        }
    }

    pub fn new_block_agreement(
        mut header: Header,
        payload: payload::BlockAgreement,
    ) -> Message {
        header.topic = Topics::BlockAgreement as u8;
        Message {
            header,
            payload: Payload::BlockAgreement(payload),
        }
    }

    pub fn new_sig_set_agreement(
        mut header: Header,
        payload: payload::SigSetAgreement,
    ) -> Message {
        header.topic = Topics::SigSetAgreement as u8;
        Message {
            header,
            payload: Payload::SigSetAgreement(payload),
        }
    }

    pub fn new_candidate(candidate: Candidate) -> Message {
        Message {
            header: Header {
                topic: Topics::Candidate as u8,
                ..Default::default()
            },
            payload: Payload::Candidate(Box::new(candidate)),
        }
    }

    pub fn new_get_candidate(hash: Hash) -> Message {
        Message {
            header: Header {
                topic: Topics::GetCandidate as u8,
                ..Default::default()
            },
            payload: Payload::GetCandidate(payload::GetCandidate { hash }),
        }
    }

    pub fn new_quit() -> Message {
        Message {
            header: Header {
                topic: Topics::Quit as u8,
                ..Default::default()
            },
            payload: Payload::Empty,
        }
    }

    pub fn from_block_step_votes(
        mut header: Header,
        p: payload::BlockStepVotes,
    ) -> Message {
        header.topic = Topics::Unknown as u8;
        Message {
            header,
            payload: Payload::BlockStepVotes(p),
        }
    }

    pub fn from_sig_set_step_votes(
        mut header: Header,
        p: payload::SigSetStepVotes,
    ) -> Message {
        header.topic = Topics::Unknown as u8;
        Message {
            header,
            payload: Payload::SigSetStepVotes(p),
        }
    }

    pub fn topic(&self) -> Topics {
        Topics::from(self.header.topic)
    }

    pub fn compare(&self, round: u64, step: u8) -> Status {
        self.header.compare(round, step)
    }

    /// Digest of the canonical encoding, used to drop duplicated events.
    pub fn digest(&self) -> Hash {
        let mut buf = Vec::new();
        if self.write(&mut buf).is_err() {
            return [0u8; 32];
        }

        let mut hasher = Sha3_256::new();
        hasher.update(&buf);
        hasher.finalize().into()
    }
}

/// EventHeader of any committee-signed consensus event.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct Header {
    pub pubkey_bls: PublicKey,
    pub round: u64,
    pub step: u8,

    pub topic: u8,
}

impl Serializable for Header {
    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.round.to_le_bytes())?;
        w.write_all(&[self.step])?;
        self.pubkey_bls.write(w)?;

        Ok(())
    }

    fn read<R: Read>(r: &mut R) -> io::Result<Self>
    where
        Self: Sized,
    {
        let mut header = Header::default();
        header.read_event_fields(r)?;

        Ok(header)
    }
}

impl Header {
    fn read_event_fields<R: Read>(&mut self, r: &mut R) -> io::Result<()> {
        self.round = Self::read_u64_le(r)?;
        self.step = Self::read_u8(r)?;
        self.pubkey_bls = PublicKey::read(r)?;

        Ok(())
    }

    pub fn compare(&self, round: u64, step: u8) -> Status {
        if self.round == round {
            if self.step == step {
                return Status::Present;
            }

            if self.step > step {
                return Status::Future;
            }

            return Status::Past;
        }

        if self.round > round {
            return Status::Future;
        }

        Status::Past
    }

    pub fn compare_round(&self, round: u64) -> Status {
        if self.round == round {
            return Status::Present;
        }

        if self.round > round {
            return Status::Future;
        }

        Status::Past
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Score(payload::Score),
    Candidate(Box<Candidate>),
    GetCandidate(payload::GetCandidate),
    Reduction(payload::Reduction),
    SigSet(payload::SigSet),
    BlockAgreement(payload::BlockAgreement),
    SigSetAgreement(payload::SigSetAgreement),

    /// Internal result of a block-reduction step. Not sent on the wire.
    BlockStepVotes(payload::BlockStepVotes),
    /// Internal result of a sigset-reduction step. Not sent on the wire.
    SigSetStepVotes(payload::SigSetStepVotes),
    Empty,
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Empty
    }
}

pub mod payload {
    use super::*;

    /// Common view over the two vote payload flavours as the vote
    /// aggregation needs them.
    pub trait VotePayload {
        fn voted_hash(&self) -> &Hash;
        fn signed_hash(&self) -> &[u8];
    }

    /// A block generator's claim, with proof, to be the producer for the
    /// current (round, step).
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Score {
        pub score: [u8; 32],
        pub proof: Vec<u8>,
        pub z: [u8; 32],
        pub seed: Seed,
        pub bid_list_subset: Vec<u8>,
        pub vote_hash: Hash,
        pub pubkey_ed25519: [u8; 32],
        pub signature_ed25519: [u8; 64],
    }

    impl Default for Score {
        fn default() -> Self {
            Self {
                score: [0; 32],
                proof: vec![],
                z: [0; 32],
                seed: Seed::default(),
                bid_list_subset: vec![],
                vote_hash: [0; 32],
                pubkey_ed25519: [0; 32],
                signature_ed25519: [0; 64],
            }
        }
    }

    impl Serializable for Score {
        fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
            w.write_all(&self.score[..])?;
            Self::write_var_bytes(w, &self.proof)?;
            w.write_all(&self.z[..])?;
            self.seed.write(w)?;
            Self::write_var_bytes(w, &self.bid_list_subset)?;
            w.write_all(&self.vote_hash[..])?;
            w.write_all(&self.pubkey_ed25519[..])?;
            w.write_all(&self.signature_ed25519[..])?;

            Ok(())
        }

        fn read<R: Read>(r: &mut R) -> io::Result<Self>
        where
            Self: Sized,
        {
            let score = Self::read_bytes(r)?;
            let proof = Self::read_var_bytes(r)?;
            let z = Self::read_bytes(r)?;
            let seed = Seed::read(r)?;
            let bid_list_subset = Self::read_var_bytes(r)?;
            let vote_hash = Self::read_bytes(r)?;
            let pubkey_ed25519 = Self::read_bytes(r)?;
            let signature_ed25519 = Self::read_bytes(r)?;

            Ok(Score {
                score,
                proof,
                z,
                seed,
                bid_list_subset,
                vote_hash,
                pubkey_ed25519,
                signature_ed25519,
            })
        }
    }

    /// A block-reduction vote: a BLS signature over
    /// `votedHash || round || step`.
    #[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
    pub struct Reduction {
        pub voted_hash: Hash,
        pub signed_hash: Vec<u8>,
    }

    impl VotePayload for Reduction {
        fn voted_hash(&self) -> &Hash {
            &self.voted_hash
        }

        fn signed_hash(&self) -> &[u8] {
            &self.signed_hash
        }
    }

    impl Serializable for Reduction {
        fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
            w.write_all(&self.voted_hash[..])?;
            Self::write_var_bytes(w, &self.signed_hash)?;

            Ok(())
        }

        fn read<R: Read>(r: &mut R) -> io::Result<Self>
        where
            Self: Sized,
        {
            let voted_hash = Self::read_bytes(r)?;
            let signed_hash = Self::read_var_bytes(r)?;

            Ok(Reduction {
                voted_hash,
                signed_hash,
            })
        }
    }

    /// A sigset-reduction vote: a reduction vote over a signature-set
    /// hash, bound to the agreed block.
    #[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
    pub struct SigSet {
        pub voted_hash: Hash,
        pub signed_hash: Vec<u8>,
        pub block_hash: Hash,
    }

    impl VotePayload for SigSet {
        fn voted_hash(&self) -> &Hash {
            &self.voted_hash
        }

        fn signed_hash(&self) -> &[u8] {
            &self.signed_hash
        }
    }

    impl Serializable for SigSet {
        fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
            w.write_all(&self.voted_hash[..])?;
            Self::write_var_bytes(w, &self.signed_hash)?;
            w.write_all(&self.block_hash[..])?;

            Ok(())
        }

        fn read<R: Read>(r: &mut R) -> io::Result<Self>
        where
            Self: Sized,
        {
            let voted_hash = Self::read_bytes(r)?;
            let signed_hash = Self::read_var_bytes(r)?;
            let block_hash = Self::read_bytes(r)?;

            Ok(SigSet {
                voted_hash,
                signed_hash,
                block_hash,
            })
        }
    }

    /// Asserts that a quorum was reached for `block_hash`, carrying the
    /// second-step block-reduction vote set.
    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    pub struct BlockAgreement {
        pub block_hash: Hash,
        pub votes: Vec<StepVote<Reduction>>,
    }

    impl Serializable for BlockAgreement {
        fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
            w.write_all(&self.block_hash[..])?;
            write_vote_set(w, &self.votes)?;

            Ok(())
        }

        fn read<R: Read>(r: &mut R) -> io::Result<Self>
        where
            Self: Sized,
        {
            let block_hash = Self::read_bytes(r)?;
            let votes = read_vote_set(r)?;

            Ok(BlockAgreement { block_hash, votes })
        }
    }

    /// Asserts that a quorum was reached on the signature set bound to
    /// `block_hash`, carrying the sigset-reduction vote set.
    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    pub struct SigSetAgreement {
        pub block_hash: Hash,
        pub votes: Vec<StepVote<SigSet>>,
    }

    impl Serializable for SigSetAgreement {
        fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
            w.write_all(&self.block_hash[..])?;
            write_vote_set(w, &self.votes)?;

            Ok(())
        }

        fn read<R: Read>(r: &mut R) -> io::Result<Self>
        where
            Self: Sized,
        {
            let block_hash = Self::read_bytes(r)?;
            let votes = read_vote_set(r)?;

            Ok(SigSetAgreement { block_hash, votes })
        }
    }

    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct GetCandidate {
        pub hash: Hash,
    }

    impl Serializable for GetCandidate {
        fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
            w.write_all(&self.hash[..])
        }

        fn read<R: Read>(r: &mut R) -> io::Result<Self>
        where
            Self: Sized,
        {
            Ok(GetCandidate {
                hash: Self::read_bytes(r)?,
            })
        }
    }

    /// Winner of the first block-reduction step, handed to the second.
    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    pub struct BlockStepVotes {
        pub voted_hash: Hash,
        pub votes: Vec<StepVote<Reduction>>,
    }

    /// Winner of the first sigset-reduction step, handed to the second.
    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    pub struct SigSetStepVotes {
        pub voted_hash: Hash,
        pub block_hash: Hash,
        pub votes: Vec<StepVote<SigSet>>,
    }
}

/// AsyncQueue is a thin wrapper of async_channel.
#[derive(Clone)]
pub struct AsyncQueue<M: Clone> {
    receiver: async_channel::Receiver<M>,
    sender: async_channel::Sender<M>,
}

impl<M: Clone> Default for AsyncQueue<M> {
    fn default() -> Self {
        let (sender, receiver) = async_channel::unbounded();
        Self { receiver, sender }
    }
}

impl<M: Clone> AsyncQueue<M> {
    pub fn bounded(cap: usize) -> Self {
        let (sender, receiver) = async_channel::bounded(cap);
        Self { receiver, sender }
    }

    pub fn send(&self, msg: M) -> async_channel::Send<'_, M> {
        self.sender.send(msg)
    }

    pub fn try_send(
        &self,
        msg: M,
    ) -> Result<(), async_channel::TrySendError<M>> {
        self.sender.try_send(msg)
    }

    pub fn recv(&self) -> async_channel::Recv<'_, M> {
        self.receiver.recv()
    }
}
