//! Dispatcher behaviour over real loopback connections.

use async_trait::async_trait;
use mw_consensus::{
    Block, BlockHeader, Capabilities, ConsensusError, Difficulty, Hash, Locator, Proof,
    Transaction, PROOF_SIZE,
};
use mw_network::{
    ChainSummary, Message, MessageHandler, NetConfig, NetworkResult, Peer, PeersPool, Ping,
};
use mw_sync::{Blockchain, ChainError, Mempool, StateError, Syncer};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

fn test_header(height: u64) -> BlockHeader {
    BlockHeader {
        version: 1,
        height,
        timestamp: 1_535_000_000 + height as i64 * 60,
        previous: Hash::of(b"prev"),
        previous_root: Hash::of(b"prev root"),
        output_root: Hash::of(b"outputs"),
        range_proof_root: Hash::of(b"proofs"),
        kernel_root: Hash::of(b"kernels"),
        total_kernel_offset: Hash::ZERO,
        output_mmr_size: height,
        kernel_mmr_size: height,
        total_difficulty: Difficulty::from_num(100 + height),
        scaling_difficulty: 1,
        nonce: height,
        pow: Proof::new(31, (1..=PROOF_SIZE as u32).map(|i| i * 7).collect()),
    }
}

fn test_block(height: u64) -> Block {
    Block {
        header: test_header(height),
        inputs: vec![],
        outputs: vec![],
        kernels: vec![],
    }
}

fn empty_tx() -> Transaction {
    Transaction {
        kernel_offset: Hash::ZERO,
        inputs: vec![],
        outputs: vec![],
        kernels: vec![],
    }
}

/// In-memory chain fake with scriptable outcomes.
struct FakeChain {
    height: u64,
    total_difficulty: Difficulty,
    blocks: HashMap<Hash, Block>,
    header_result: Result<(), ChainError>,
    block_result: Result<(), ChainError>,
    headers_processed: usize,
    blocks_processed: usize,
}

impl FakeChain {
    fn new() -> Self {
        Self {
            height: 7,
            total_difficulty: Difficulty::from_num(7000),
            blocks: HashMap::new(),
            header_result: Ok(()),
            block_result: Ok(()),
            headers_processed: 0,
            blocks_processed: 0,
        }
    }
}

impl Blockchain for FakeChain {
    fn genesis(&self) -> Block {
        test_block(0)
    }

    fn total_difficulty(&self) -> Difficulty {
        self.total_difficulty
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn locator(&self) -> Locator {
        Locator::new(vec![Hash::of(b"fake tip")])
    }

    fn block_headers(&self, _locator: &Locator) -> Vec<BlockHeader> {
        vec![test_header(self.height)]
    }

    fn block(&self, hash: &Hash) -> Option<Block> {
        self.blocks.get(hash).cloned()
    }

    fn process_headers(&mut self, headers: &[BlockHeader]) -> Result<(), ChainError> {
        self.headers_processed += headers.len();
        self.header_result.clone()
    }

    fn process_block(&mut self, _block: &Block) -> Result<(), ChainError> {
        self.blocks_processed += 1;
        self.block_result.clone()
    }
}

struct FakeMempool {
    result: Result<(), ChainError>,
    processed: usize,
}

impl Mempool for FakeMempool {
    fn process_tx(&mut self, _tx: Transaction) -> Result<(), ChainError> {
        self.processed += 1;
        self.result.clone()
    }
}

struct ChainView(Arc<RwLock<FakeChain>>);

impl ChainSummary for ChainView {
    fn total_difficulty(&self) -> Difficulty {
        self.0.read().total_difficulty()
    }

    fn height(&self) -> u64 {
        self.0.read().height()
    }
}

struct Collector {
    tx: mpsc::Sender<Message>,
}

#[async_trait]
impl MessageHandler for Collector {
    async fn handle(&self, _peer: Arc<Peer>, msg: Message) -> NetworkResult<()> {
        let _ = self.tx.send(msg).await;
        Ok(())
    }
}

struct Node {
    chain: Arc<RwLock<FakeChain>>,
    mempool: Arc<Mutex<FakeMempool>>,
    pool: Arc<PeersPool>,
    addr: SocketAddr,
}

/// Stand up a listening node wired to a fake chain and mempool.
async fn start_node() -> Node {
    let chain = Arc::new(RwLock::new(FakeChain::new()));
    let mempool = Arc::new(Mutex::new(FakeMempool {
        result: Ok(()),
        processed: 0,
    }));

    let pool = PeersPool::new(NetConfig::default(), Arc::new(ChainView(chain.clone())));
    let syncer = Syncer::new(chain.clone(), mempool.clone(), pool.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let accept_pool = pool.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, peer_addr)) = listener.accept().await else {
                break;
            };
            let handler: Arc<dyn MessageHandler> = syncer.clone();
            let _ = accept_pool.accept(stream, peer_addr, handler).await;
        }
    });

    Node {
        chain,
        mempool,
        pool,
        addr,
    }
}

async fn connect_client(node: &Node) -> (Arc<Peer>, mpsc::Receiver<Message>) {
    let (tx, rx) = mpsc::channel(16);
    let peer = Peer::connect(
        node.addr,
        &NetConfig::default(),
        Difficulty::from_num(1),
        rand::random(),
        Arc::new(Collector { tx }),
    )
    .await
    .unwrap();
    (peer, rx)
}

async fn recv(rx: &mut mpsc::Receiver<Message>) -> Message {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("reply within deadline")
        .expect("connection alive")
}

/// Poll `cond` until it holds or the deadline passes.
async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn ping_is_answered_with_local_chain_state() {
    let node = start_node().await;
    let (peer, mut rx) = connect_client(&node).await;

    peer.send(Message::Ping(Ping {
        total_difficulty: Difficulty::from_num(9),
        height: 4,
    }))
    .await;

    match recv(&mut rx).await {
        Message::Pong(pong) => {
            assert_eq!(pong.total_difficulty, Difficulty::from_num(7000));
            assert_eq!(pong.height, 7);
        }
        other => panic!("wrong reply: {:?}", other.msg_type()),
    }

    // The ping also updated our view of the sender.
    let key = peer_key(&node, &peer);
    let entry = node.pool.peer_info(&key).unwrap();
    let info = entry.lock();
    assert_eq!(info.total_difficulty, Difficulty::from_num(9));
    assert_eq!(info.height, 4);
}

#[tokio::test]
async fn peer_request_is_answered_from_the_pool() {
    let node = start_node().await;
    node.pool.add("10.9.9.9:13414");

    let (peer, mut rx) = connect_client(&node).await;
    peer.send(Message::GetPeerAddrs(Capabilities::UNKNOWN)).await;

    match recv(&mut rx).await {
        Message::PeerAddrs(addrs) => {
            assert!(addrs.contains(&"10.9.9.9:13414".parse().unwrap()));
        }
        other => panic!("wrong reply: {:?}", other.msg_type()),
    }
}

#[tokio::test]
async fn received_peer_addrs_enter_the_pool() {
    let node = start_node().await;
    let (peer, _rx) = connect_client(&node).await;

    peer.send(Message::PeerAddrs(vec!["10.3.3.3:13414".parse().unwrap()]))
        .await;

    let pool = node.pool.clone();
    assert!(eventually(move || pool.peer_info("10.3.3.3:13414").is_some()).await);
}

#[tokio::test]
async fn header_request_is_answered_from_the_chain() {
    let node = start_node().await;
    let (peer, mut rx) = connect_client(&node).await;

    peer.send(Message::GetHeaders(Locator::new(vec![Hash::of(b"tip")])))
        .await;

    match recv(&mut rx).await {
        Message::Headers(headers) => {
            assert_eq!(headers.len(), 1);
            assert_eq!(headers[0].height, 7);
        }
        other => panic!("wrong reply: {:?}", other.msg_type()),
    }
}

#[tokio::test]
async fn block_request_is_silent_for_unknown_blocks() {
    let node = start_node().await;

    let known = test_block(3);
    let known_hash = known.hash();
    node.chain.write().blocks.insert(known_hash, known);

    let (peer, mut rx) = connect_client(&node).await;

    peer.send(Message::GetBlock(Hash::of(b"nothing here"))).await;
    peer.send(Message::GetBlock(known_hash)).await;

    // Only the known block produces a reply.
    match recv(&mut rx).await {
        Message::Block(block) => assert_eq!(block.hash(), known_hash),
        other => panic!("wrong reply: {:?}", other.msg_type()),
    }
    assert!(
        tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn bad_block_bans_the_sender() {
    let node = start_node().await;
    node.chain.write().block_result =
        Err(ChainError::Consensus(ConsensusError::InvalidPow));

    let (peer, _rx) = connect_client(&node).await;
    let key = peer_key(&node, &peer);

    peer.send(Message::Block(test_block(8))).await;

    let pool = node.pool.clone();
    let ban_key = key.clone();
    assert!(eventually(move || pool.is_banned(&ban_key)).await);

    // Banned peers disappear from the table and from peer listings.
    assert!(node.pool.peer_info(&key).is_none());
    let listed = node.pool.peers(Capabilities::UNKNOWN);
    assert!(!listed.iter().any(|a| a.to_string() == key));
}

#[tokio::test]
async fn state_conflicts_do_not_ban() {
    let node = start_node().await;
    node.chain.write().block_result = Err(ChainError::State(StateError::AlreadyKnown(
        Hash::of(b"dup"),
    )));

    let (peer, _rx) = connect_client(&node).await;
    let key = peer_key(&node, &peer);

    peer.send(Message::Block(test_block(8))).await;

    let chain = node.chain.clone();
    assert!(eventually(move || chain.read().blocks_processed == 1).await);
    assert!(!node.pool.is_banned(&key));
    assert!(node.pool.peer_info(&key).is_some());
}

#[tokio::test]
async fn bad_header_batch_bans_but_single_header_does_not() {
    let node = start_node().await;
    node.chain.write().header_result =
        Err(ChainError::Consensus(ConsensusError::InvalidPow));

    // A failing singleton header is forgiven.
    let (peer, _rx) = connect_client(&node).await;
    let key = peer_key(&node, &peer);
    peer.send(Message::Header(test_header(9))).await;

    let chain = node.chain.clone();
    assert!(eventually(move || chain.read().headers_processed == 1).await);
    assert!(!node.pool.is_banned(&key));

    // A failing batch is not.
    peer.send(Message::Headers(vec![test_header(9), test_header(10)]))
        .await;
    let pool = node.pool.clone();
    let ban_key = key.clone();
    assert!(eventually(move || pool.is_banned(&ban_key)).await);
}

#[tokio::test]
async fn bad_transaction_bans_the_sender() {
    let node = start_node().await;
    node.mempool.lock().result = Err(ChainError::Consensus(
        ConsensusError::InvalidKernelSignature,
    ));

    let (peer, _rx) = connect_client(&node).await;
    let key = peer_key(&node, &peer);

    peer.send(Message::Transaction(empty_tx())).await;

    let pool = node.pool.clone();
    let ban_key = key.clone();
    assert!(eventually(move || pool.is_banned(&ban_key)).await);
    assert_eq!(node.mempool.lock().processed, 1);
}

#[tokio::test]
async fn tip_blocks_are_propagated_to_lagging_peers() {
    let node = start_node().await;

    // A second connected peer that is behind.
    let (lagging, mut lagging_rx) = connect_client(&node).await;
    let lagging_key = peer_key(&node, &lagging);
    {
        let entry = node.pool.peer_info(&lagging_key).unwrap();
        let mut info = entry.lock();
        info.height = 1;
        info.total_difficulty = Difficulty::from_num(1);
    }

    // A block arriving at exactly our tip height gets fanned out.
    let (sender, _rx) = connect_client(&node).await;
    sender.send(Message::Block(test_block(7))).await;

    match recv(&mut lagging_rx).await {
        Message::Block(block) => assert_eq!(block.header.height, 7),
        other => panic!("wrong message: {:?}", other.msg_type()),
    }
}

/// The key the node's pool files this client under: the client's address
/// as the server sees it.
fn peer_key(_node: &Node, peer: &Arc<Peer>) -> String {
    peer.local_addr().expect("connected socket").to_string()
}
