//! # Adversarial Inputs
//!
//! Forged votes and certificates must never reach the forest or count
//! towards a quorum. Byzantine proposers still get their blocks committed,
//! but lower the chain quality.

#[cfg(test)]
mod tests {
    use crate::harness::{self, init_tracing, Cluster};
    use chained_consensus::{
        BlockChain, ByzantinePolicy, ChainApi, ChainError, VoteOutcome,
    };
    use shared_crypto::{CryptoError, KeyStore, SignatureService, SigningAlgorithm};
    use shared_types::{quorum_certificate_id, Block, QuorumCertificate, ReplicaId, Signature, Vote};
    use std::sync::Arc;

    fn chain_with_keys(scheme: SigningAlgorithm) -> (BlockChain<KeyStore>, Arc<KeyStore>) {
        init_tracing();
        let config = harness::config(1, scheme);
        let keys = harness::deployment_keys(&config);
        let chain = BlockChain::new(config, ReplicaId(1), Arc::clone(&keys)).unwrap();
        (chain, keys)
    }

    #[test]
    fn test_byzantine_replica_cannot_vote_twice() {
        let (mut chain, keys) = chain_with_keys(SigningAlgorithm::Ed25519);
        let block = harness::root(1, ReplicaId(2));
        chain.add_block(block.clone()).unwrap();

        for _ in 0..5 {
            chain.add_vote(harness::vote(&keys, ReplicaId(1), &block)).unwrap();
        }
        let outcome = chain
            .add_vote(harness::vote(&keys, ReplicaId(2), &block))
            .unwrap();

        assert_eq!(outcome, VoteOutcome::Recorded);
        assert_eq!(chain.quorum().vote_count(1, &block.id), 2);
        assert!(!chain.quorum().is_certified(1, &block.id));
    }

    #[test]
    fn test_vote_from_outside_replica_set_rejected() {
        let (mut chain, keys) = chain_with_keys(SigningAlgorithm::EcdsaSecp256k1);
        let block = harness::root(1, ReplicaId(2));

        let mut outsider = harness::vote(&keys, ReplicaId(3), &block);
        outsider.voter = ReplicaId(99);
        assert_eq!(chain.add_vote(outsider).unwrap(), VoteOutcome::InvalidSignature);

        // A vote re-targeted at another block does not verify
        let mut retargeted = harness::vote(&keys, ReplicaId(3), &block);
        retargeted.block_id = harness::root(2, ReplicaId(2)).id;
        assert_eq!(chain.add_vote(retargeted).unwrap(), VoteOutcome::InvalidSignature);
    }

    #[test]
    fn test_replayed_votes_cannot_inflate_high_qc() {
        let (mut chain, keys) = chain_with_keys(SigningAlgorithm::Ed25519);
        let config = chain.config().clone();
        let block = harness::root(1, ReplicaId(2));
        chain.add_block(block.clone()).unwrap();

        // Vote bytes cover the block only, so the view can be rewritten
        let voters = [ReplicaId(2), ReplicaId(3), ReplicaId(4)];
        for voter in voters {
            let original = harness::vote(&keys, voter, &block);
            let replay = Vote::new(original.voter, 1000, original.block_id, original.signature);
            assert_eq!(chain.add_vote(replay).unwrap(), VoteOutcome::ViewMismatch);
        }
        assert_eq!(chain.quorum().vote_count(1000, &block.id), 0);

        // A certificate relabeled by a colluding leader is refused as high QC
        let mut relabeled = harness::certificate(&keys, &block, &voters, ReplicaId(2));
        relabeled.view = 1000;
        relabeled.leader_signature = keys
            .sign(&quorum_certificate_id(1000, &block.id), ReplicaId(2))
            .unwrap();
        assert!(keys.verify_quorum_certificate(&relabeled).unwrap());
        assert!(!chain.update_high_qc(relabeled));
        assert_eq!(chain.high_qc().view, 0);

        // The genuine votes still certify the block at its own view
        let qc = chain
            .add_votes(voters.iter().map(|v| harness::vote(&keys, *v, &block)).collect())
            .unwrap()
            .into_iter()
            .find_map(VoteOutcome::into_quorum_certificate)
            .unwrap();
        assert_eq!(qc.view, 1);
        assert!(chain.update_high_qc(qc));

        // And the next proposal on the high QC is admitted
        let next = harness::child(&keys, &config, &block, 2, ReplicaId(3));
        assert!(chain.add_block(next).unwrap());
        assert_eq!(chain.high_qc().view, 1);
    }

    #[test]
    fn test_votes_for_far_future_views_not_tallied() {
        let (mut chain, keys) = chain_with_keys(SigningAlgorithm::Ed25519);
        let window = chain.config().vote_view_window;
        let unknown = harness::root(1, ReplicaId(2));

        // Block not delivered yet: the view cannot be checked, only bounded
        for offset in [1, 1000] {
            let original = harness::vote(&keys, ReplicaId(2), &unknown);
            let replay = Vote::new(original.voter, window + offset, unknown.id, original.signature);
            assert_eq!(chain.add_vote(replay).unwrap(), VoteOutcome::OutOfWindow);
        }
        assert_eq!(chain.quorum().tally_count(), 0);

        // A faulty replica spraying blocks at one view opens one tally
        let outcomes: Vec<VoteOutcome> = (0..20u8)
            .map(|i| {
                let block = Block::new(5, ReplicaId(4), QuorumCertificate::genesis(), vec![vec![i]]);
                chain.add_vote(harness::vote(&keys, ReplicaId(4), &block)).unwrap()
            })
            .collect();
        assert_eq!(outcomes.iter().filter(|o| o.is_counted()).count(), 1);
        assert!(outcomes[1..].iter().all(|o| *o == VoteOutcome::Equivocation));
        assert_eq!(chain.quorum().tally_count(), 1);
    }

    #[test]
    fn test_forged_certificates_never_admitted() {
        let (mut chain, keys) = chain_with_keys(SigningAlgorithm::BlsBls12381);
        let config = chain.config().clone();
        let root = harness::root(1, ReplicaId(2));
        chain.add_block(root.clone()).unwrap();

        // f + 1 signers are not a quorum
        let thin = harness::certificate(&keys, &root, &[ReplicaId(1), ReplicaId(2)], ReplicaId(1));
        let block = Block::new(2, ReplicaId(3), thin, vec![]);
        assert!(matches!(
            chain.add_block(block),
            Err(ChainError::InsufficientSigners { got: 2, required: 3, .. })
        ));

        // Padding with a repeated signer is malformed
        let mut padded = harness::certificate(&keys, &root, &[ReplicaId(1), ReplicaId(2)], ReplicaId(1));
        padded.signers.push(ReplicaId(2));
        padded.signatures.push(padded.signatures[1].clone());
        let block = Block::new(2, ReplicaId(3), padded, vec![]);
        assert!(matches!(
            chain.add_block(block),
            Err(ChainError::Crypto(CryptoError::DuplicateSigner(ReplicaId(2))))
        ));

        // Leader signature over a different view
        let mut relabeled = harness::quorum_certificate(&keys, &config, &root);
        relabeled.view = 3;
        let block = Block::new(4, ReplicaId(3), relabeled, vec![]);
        assert!(matches!(
            chain.add_block(block),
            Err(ChainError::InvalidSignature(_))
        ));

        // Zeroed member signature
        let mut zeroed = harness::quorum_certificate(&keys, &config, &root);
        zeroed.signatures[1] = Signature::new(vec![0u8; 96]);
        let block = Block::new(2, ReplicaId(3), zeroed, vec![]);
        assert!(chain.add_block(block).is_err());

        assert_eq!(chain.stats().live_blocks, 1);
        assert_eq!(chain.high_qc().view, 0);
    }

    #[test]
    fn test_genesis_lookalike_requires_zero_parent() {
        let (mut chain, _keys) = chain_with_keys(SigningAlgorithm::Ed25519);
        let root = harness::root(1, ReplicaId(2));
        chain.add_block(root.clone()).unwrap();

        // Claims a real parent while carrying the unsigned genesis QC
        let mut sneaky = Block::new(2, ReplicaId(3), QuorumCertificate::genesis(), vec![]);
        sneaky.parent = root.id;
        sneaky.id = Block::compute_id(sneaky.view, sneaky.proposer, &sneaky.parent, &sneaky.qc, &sneaky.payload);

        assert!(matches!(
            chain.add_block(sneaky),
            Err(ChainError::QcParentMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_byzantine_proposers_lower_chain_quality() {
        init_tracing();
        let config = harness::config(1, SigningAlgorithm::Ed25519).with_byzantine(
            ByzantinePolicy::Explicit([ReplicaId(2), ReplicaId(3)].into_iter().collect()),
        );
        let cluster = Cluster::start(config);

        cluster.run_views(1, 6).await;

        // Committed views 1..=3 were proposed by 2, 3, 4
        for replica in &cluster.replicas {
            let stats = replica.chain.stats();
            assert_eq!(stats.committed_blocks, 3);
            assert_eq!(stats.honest_committed_blocks, 1);
            assert_eq!(stats.chain_quality, Some(1.0 / 3.0));
        }

        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_equivocating_leader_forks_then_one_branch_wins() {
        init_tracing();
        let cluster = Cluster::start(harness::config(1, SigningAlgorithm::Ed25519));
        let blocks = cluster.run_views(1, 1).await;

        // Leader of view 2 sends two different blocks
        let proposer = cluster.leader(2);
        let left = cluster.propose(proposer, 2, vec![b"left".to_vec()]);
        let right = cluster.propose(proposer, 2, vec![b"right".to_vec()]);
        cluster.deliver(&left, [ReplicaId(1), ReplicaId(2)]).await;
        cluster.deliver(&right, [ReplicaId(3), ReplicaId(4)]).await;
        cluster.deliver(&left, [ReplicaId(3), ReplicaId(4)]).await;
        cluster.deliver(&right, [ReplicaId(1), ReplicaId(2)]).await;

        let first = &cluster.replica(ReplicaId(1)).chain;
        let third = &cluster.replica(ReplicaId(3)).chain;
        assert_eq!(first.get_children_blocks(&blocks[0].id).len(), 2);
        // Arrival order decides the block returned by view
        assert_eq!(first.get_block_by_view(2).unwrap().id, left.id);
        assert_eq!(third.get_block_by_view(2).unwrap().id, right.id);

        // Three honest votes only exist for one branch
        let collector = cluster.leader(3);
        assert!(cluster
            .collect_votes(collector, &left, [ReplicaId(1), ReplicaId(2), ReplicaId(4)])
            .await
            .is_some());
        assert!(cluster
            .collect_votes(collector, &right, [ReplicaId(3)])
            .await
            .is_none());

        for view in 3..=5 {
            let block = cluster.propose(cluster.leader(view), view, vec![]);
            cluster.broadcast(&block).await;
            cluster.commit_where_ready(&block).await;
            cluster
                .collect_votes(cluster.leader(view + 1), &block, cluster.config.replicas())
                .await;
        }

        // Committing view 2 on the left branch prunes the right one
        for replica in &cluster.replicas {
            let stats = replica.chain.stats();
            assert_eq!(stats.highest_committed, 2);
            assert_eq!(stats.committed_blocks, 2);
            assert_eq!(stats.pruned_blocks, 3);
            assert!(matches!(
                replica.chain.get_block_by_id(&right.id),
                Err(ChainError::BlockNotFound(_))
            ));
        }
        assert_eq!(
            cluster.replica(ReplicaId(1)).chain.read(|chain| chain.forking_rate()),
            Some(1.0 / 3.0)
        );
    }
}
