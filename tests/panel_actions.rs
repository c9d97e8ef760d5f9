use std::sync::Arc;
use std::time::Duration;

use control_panel::capabilities::{Capabilities, HttpMethod};
use control_panel::lifecycle::CONNECTION_LOST_MESSAGE;
use control_panel::notification::Delivery;
use control_panel::report::SELECTED_ATTACHMENTS_INPUT;
use control_panel::testing::{
    fixed_time, FakeDom, FixedClock, RecordingDashboard, RecordingNotifier, ScriptedRefresh,
    ScriptedTransport,
};
use control_panel::{
    AttachmentRef, EntryId, NotificationRequest, PanelConfig, PanelController, ReportData,
    Severity, UiEvent, CONNECTION_STATUS_ID, LAST_UPDATE_TIME_ID,
};
use serde_json::json;

fn status_page() -> (
    Arc<FakeDom>,
    Arc<ScriptedTransport>,
    Arc<RecordingNotifier>,
    Arc<RecordingDashboard>,
    PanelController,
) {
    let dom = Arc::new(FakeDom::new().with_element("status-btn-12"));
    let transport = Arc::new(ScriptedTransport::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let dashboard = Arc::new(RecordingDashboard::new());
    let caps = Capabilities::new(transport.clone(), dom.clone())
        .with_notifier(notifier.clone())
        .with_dashboard(dashboard.clone());
    let panel = PanelController::new(PanelConfig::default(), caps).unwrap();
    (dom, transport, notifier, dashboard, panel)
}

#[tokio::test]
async fn status_change_updates_button_and_dashboard() {
    let (dom, transport, notifier, dashboard, panel) = status_page();
    transport.push_json(
        200,
        json!({
            "success": true,
            "dashboard": {"pedidos": {"total": 3, "nao_iniciado": 0, "em_andamento": 2, "concluido": 1}}
        }),
    );

    // 1. User picks a status from the dropdown
    panel
        .dispatch(UiEvent::StatusOptionSelected {
            entry_id: EntryId(12),
            status: "Em andamento".into(),
        })
        .await;

    // 2. One POST carrying the new status
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method(), HttpMethod::Post);
    assert_eq!(
        requests[0].json_body(),
        Some(json!({"status": "Em andamento"}))
    );

    // 3. Button reflects it, dashboard got the payload, nothing shown to the user
    let button = dom.element("status-btn-12").unwrap();
    assert_eq!(button.text, "Em andamento");
    assert_eq!(button.class_name, "btn btn-warning btn-sm dropdown-toggle");
    assert_eq!(dashboard.payloads().len(), 1);
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn status_change_rejected_by_server_is_reported() {
    let (dom, transport, notifier, dashboard, panel) = status_page();
    transport.push_json(500, json!({"success": false}));

    assert!(!panel.update_status(EntryId(12), "Concluído").await);

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].1, Severity::Error);
    assert!(messages[0].0.starts_with("Erro ao atualizar o status:"));
    assert!(messages[0].0.contains("500"));
    assert!(dashboard.payloads().is_empty());
    assert_eq!(dom.element("status-btn-12").unwrap().text, "");
}

#[tokio::test]
async fn status_change_domain_failure_shows_server_message() {
    let (_dom, transport, notifier, _dashboard, panel) = status_page();
    transport.push_json(200, json!({"success": false, "message": "Status inválido."}));

    assert!(!panel.update_status(EntryId(12), "Pausado").await);
    assert_eq!(
        notifier.messages()[0].0,
        "Erro ao atualizar o status: Status inválido."
    );
}

#[tokio::test(start_paused = true)]
async fn notifications_fall_back_to_a_banner() {
    let dom = Arc::new(FakeDom::new());
    let caps = Capabilities::new(Arc::new(ScriptedTransport::new()), dom.clone());
    let panel = PanelController::new(PanelConfig::default(), caps).unwrap();

    let delivery = panel.show_notification(
        &NotificationRequest::new("Relatório <pronto>", Severity::Success)
            .with_duration(Duration::from_millis(1_000)),
    );
    let Delivery::Banner { element_id } = delivery else {
        panic!("expected a banner, got {delivery:?}");
    };

    let banner = dom.element(&element_id).unwrap();
    assert!(banner.html.contains("alert-success"));
    assert!(banner.html.contains("Relatório &lt;pronto&gt;"));

    tokio::time::sleep(Duration::from_millis(1_001)).await;
    assert!(dom.element(&element_id).is_none());
}

#[tokio::test]
async fn notifications_reach_the_console_when_nothing_else_works() {
    let dom = Arc::new(FakeDom::new().failing_appends());
    let caps = Capabilities::new(Arc::new(ScriptedTransport::new()), dom)
        .with_notifier(Arc::new(RecordingNotifier::failing()));
    let panel = PanelController::new(PanelConfig::default(), caps).unwrap();

    assert_eq!(panel.notify("Olá", Severity::Info), Delivery::Console);
}

#[tokio::test]
async fn report_request_builds_the_preview() {
    let dom = Arc::new(
        FakeDom::new()
            .with_input("report-date-9", "2024-02-01")
            .with_input("report-order-number-9", "PED-9")
            .with_input("report-client-number-9", "C-9")
            .with_input("report-client-name-9", "Atelier Sol")
            .with_input("report-project-9", "Sala")
            .with_checked("report-config-9", SELECTED_ATTACHMENTS_INPUT, &["21", "22"]),
    );
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_json(
        200,
        json!({"success": true, "attachments": [
            {"id": 21, "filename": "sala.webp"},
            {"id": 22, "filename": "contrato.docx"}
        ]}),
    );
    let caps = Capabilities::new(transport.clone(), dom.clone());
    let panel = PanelController::new(PanelConfig::default(), caps).unwrap();

    panel
        .dispatch(UiEvent::ReportRequested {
            entry_id: EntryId(9),
        })
        .await;

    assert_eq!(transport.requests()[0].method(), HttpMethod::Get);
    assert_eq!(dom.hidden_modals(), vec!["report-config-9".to_string()]);
    assert_eq!(dom.shown_modals(), vec!["report-preview-9".to_string()]);

    let html = dom.element("report-preview-9").unwrap().html;
    assert!(html.contains("01/02/2024"));
    assert!(html.contains("Atelier Sol"));
    assert!(html.contains("sala.webp"));
    assert!(!html.contains("contrato.docx"));

    // Closing the preview removes its markup.
    assert!(dom.fire_modal_hidden("report-preview-9"));
    assert!(dom.element("report-preview-9").is_none());
}

#[tokio::test]
async fn report_failure_is_shown_to_the_user() {
    let dom = Arc::new(FakeDom::new().failing_appends());
    let notifier = Arc::new(RecordingNotifier::new());
    let caps = Capabilities::new(Arc::new(ScriptedTransport::new()), dom)
        .with_notifier(notifier.clone());
    let panel = PanelController::new(PanelConfig::default(), caps).unwrap();

    assert!(panel.generate_report(EntryId(3)).await.is_err());

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].0.starts_with("Erro ao gerar relatório:"));
    assert_eq!(messages[0].1, Severity::Error);
}

#[tokio::test]
async fn open_report_shows_only_image_attachments() {
    let dom = Arc::new(FakeDom::new());
    let caps = Capabilities::new(Arc::new(ScriptedTransport::new()), dom.clone());
    let panel = PanelController::new(PanelConfig::default(), caps).unwrap();

    let report = ReportData {
        entry_id: EntryId(4),
        date: "2024-05-20".into(),
        order_number: "PED-4".into(),
        client_number: "C-4".into(),
        client_name: "Casa Nova".into(),
        project: None,
        attachments: vec![
            AttachmentRef {
                id: 1,
                filename: "a.png".into(),
            },
            AttachmentRef {
                id: 2,
                filename: "b.txt".into(),
            },
            AttachmentRef {
                id: 3,
                filename: "C.JPG".into(),
            },
        ],
    };
    let modal_id = panel.open_report(&report).unwrap();

    let html = dom.element(&modal_id).unwrap().html;
    assert_eq!(html.matches("<img ").count(), 2);
    assert!(html.contains("a.png"));
    assert!(html.contains("C.JPG"));
    assert!(!html.contains("b.txt"));
}

#[tokio::test]
async fn manual_refresh_tracks_failures_until_reconnected() {
    let dom = Arc::new(
        FakeDom::new()
            .with_element(CONNECTION_STATUS_ID)
            .with_element(LAST_UPDATE_TIME_ID),
    );
    let notifier = Arc::new(RecordingNotifier::new());
    let refresh = Arc::new(ScriptedRefresh::new());
    refresh.push_failures(3);
    let caps = Capabilities::new(Arc::new(ScriptedTransport::new()), dom.clone())
        .with_notifier(notifier.clone())
        .with_auto_refresh(refresh.clone())
        .with_clock(Arc::new(FixedClock::new(fixed_time(9, 15, 0))));
    let panel = PanelController::new(PanelConfig::default(), caps).unwrap();

    for _ in 0..3 {
        panel.dispatch(UiEvent::RefreshRequested).await;
    }
    let state = panel.state().await;
    assert_eq!(state.failed_attempts, 3);
    assert!(!state.connection_ok);
    assert!(dom
        .element(CONNECTION_STATUS_ID)
        .unwrap()
        .html
        .ends_with("Desconectado (3 falhas)"));
    assert_eq!(
        notifier.messages(),
        vec![(CONNECTION_LOST_MESSAGE.to_string(), Severity::Warning)]
    );

    // Server time, when given, drives the label.
    panel
        .update_connection(true, Some(fixed_time(9, 16, 30)))
        .await;
    let state = panel.state().await;
    assert_eq!(state.failed_attempts, 0);
    assert!(state.connection_ok);
    assert_eq!(state.last_update, Some(fixed_time(9, 15, 0)));
    assert_eq!(
        dom.element(LAST_UPDATE_TIME_ID).unwrap().text,
        "Última atualização: 09:16:30 (30s)"
    );
}
