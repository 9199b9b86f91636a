use domain::{ConnectionConfig, RegisterType};
use ems_protocol::simulator::{HR_FREQUENCY, HR_VOLTAGE};
use ems_protocol::{ModbusClientManager, ModbusSimulator, ProtocolError, SimulatorConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start_simulator() -> (Arc<ModbusSimulator>, ems_protocol::SimulatorHandle) {
    let sim = Arc::new(ModbusSimulator::new(SimulatorConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        tick_ms: 0,
        seed: Some(11),
    }));
    let handle = sim.clone().start().await.expect("start simulator");
    (sim, handle)
}

fn station(port: u16) -> ConnectionConfig {
    let mut config = ConnectionConfig::tcp("st-1", "127.0.0.1", port);
    config.timeout_ms = 1000;
    config
}

#[tokio::test]
async fn client_reads_and_writes_through_simulator() {
    let (sim, handle) = start_simulator().await;
    let manager = ModbusClientManager::new();
    manager
        .connect("st-1", &station(handle.local_addr().port()))
        .await
        .into_result()
        .expect("connect");

    let values = manager
        .read_holding_registers("st-1", HR_VOLTAGE, 4)
        .await
        .into_result()
        .expect("read holding");
    assert_eq!(values.len(), 4);
    assert_eq!(values[0], 2300);
    assert_eq!(values[3], 5000);

    manager
        .write_single_register("st-1", 20, 777)
        .await
        .into_result()
        .expect("write register");
    assert_eq!(sim.get_register(20).await, Some(777));

    manager
        .write_single_coil("st-1", 5, true)
        .await
        .into_result()
        .expect("write coil");
    let coils = manager
        .read_by_type("st-1", RegisterType::Coil, 4, 3)
        .await
        .into_result()
        .expect("read coils");
    assert_eq!(coils, vec![0, 1, 0]);

    sim.trigger_alarm(1).await.expect("trigger");
    let inputs = manager
        .read_discrete_inputs("st-1", 0, 2)
        .await
        .into_result()
        .expect("read discrete");
    assert_eq!(inputs, vec![0, 1]);

    manager.disconnect_all().await;
    assert!(manager.list_connected_ids().await.is_empty());
    handle.shutdown();
}

#[tokio::test]
async fn simulator_values_follow_direct_accessors() {
    let (sim, handle) = start_simulator().await;
    let manager = ModbusClientManager::new();
    manager
        .connect("st-1", &station(handle.local_addr().port()))
        .await
        .into_result()
        .expect("connect");

    sim.set_register(HR_FREQUENCY, 4985).await.expect("set");
    sim.set_input_register(7, 321).await.expect("set input");

    let op = manager.read_holding_registers("st-1", HR_FREQUENCY, 1).await;
    assert_eq!(op.into_result().expect("read"), vec![4985]);
    let op = manager.read_input_registers("st-1", 7, 1).await;
    assert_eq!(op.into_result().expect("read input"), vec![321]);

    handle.shutdown();
}

#[tokio::test]
async fn exception_response_surfaces_as_device_error() {
    let (_sim, handle) = start_simulator().await;
    let manager = ModbusClientManager::new();
    manager
        .connect("st-1", &station(handle.local_addr().port()))
        .await
        .into_result()
        .expect("connect");

    let op = manager.read_holding_registers("st-1", 99, 5).await;
    assert!(matches!(op.result, Err(ProtocolError::Device(_))));
    // 异常响应不影响会话
    assert!(manager.is_connected("st-1").await);

    // 模拟器不支持 FC 16
    let op = manager.write_multiple_registers("st-1", 0, &[1, 2]).await;
    assert!(matches!(op.result, Err(ProtocolError::Device(_))));

    handle.shutdown();
}

#[tokio::test]
async fn unsupported_function_returns_illegal_function() {
    let (_sim, handle) = start_simulator().await;
    let mut stream = TcpStream::connect(handle.local_addr())
        .await
        .expect("connect");

    // transaction 0x0102, FC 0x2B
    let request = [0x01, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x2B, 0x00, 0x00, 0x00, 0x01];
    stream.write_all(&request).await.expect("write");

    let mut response = [0u8; 9];
    stream.read_exact(&mut response).await.expect("read");
    assert_eq!(
        response,
        [0x01, 0x02, 0x00, 0x00, 0x00, 0x03, 0x01, 0xAB, 0x01]
    );

    handle.shutdown();
}

#[tokio::test]
async fn split_frames_are_reassembled() {
    let (_sim, handle) = start_simulator().await;
    let mut stream = TcpStream::connect(handle.local_addr())
        .await
        .expect("connect");

    let request = [0x00, 0x09, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
    stream.write_all(&request[..5]).await.expect("write head");
    tokio::time::sleep(Duration::from_millis(20)).await;
    stream.write_all(&request[5..]).await.expect("write tail");

    let mut response = [0u8; 11];
    stream.read_exact(&mut response).await.expect("read");
    assert_eq!(&response[..2], &[0x00, 0x09]);
    assert_eq!(response[7], 0x03);
    assert_eq!(response[8], 2);
    assert_eq!(u16::from_be_bytes([response[9], response[10]]), 2300);

    handle.shutdown();
}

#[tokio::test]
async fn truncated_request_gets_illegal_data_value() {
    let (_sim, handle) = start_simulator().await;
    let mut stream = TcpStream::connect(handle.local_addr())
        .await
        .expect("connect");

    // FC 3 只带起始地址，缺少数量
    let request = [0x00, 0x07, 0x00, 0x00, 0x00, 0x04, 0x01, 0x03, 0x00, 0x00];
    stream.write_all(&request).await.expect("write");

    let mut response = [0u8; 9];
    tokio::time::timeout(Duration::from_secs(1), stream.read_exact(&mut response))
        .await
        .expect("answered")
        .expect("read");
    assert_eq!(
        response,
        [0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x01, 0x83, 0x03]
    );

    handle.shutdown();
}

#[tokio::test]
async fn silent_device_times_out_and_drops_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let silent = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut sink = [0u8; 64];
        while let Ok(n) = socket.read(&mut sink).await {
            if n == 0 {
                break;
            }
        }
    });

    let manager = ModbusClientManager::new();
    let mut config = ConnectionConfig::tcp("st-1", "127.0.0.1", addr.port());
    config.timeout_ms = 300;
    manager
        .connect("st-1", &config)
        .await
        .into_result()
        .expect("connect");

    let started = Instant::now();
    let op = manager.read_holding_registers("st-1", HR_VOLTAGE, 1).await;
    assert!(matches!(op.result, Err(ProtocolError::Timeout(_))));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!manager.is_connected("st-1").await);

    silent.abort();
}
