use crate::{
    types::{AclEntry, NetworkMacro},
    Client, Credentials, Direction, Error,
};
use httptest::{matchers::*, responders::*, Expectation, Server};
use serde_json::json;

fn client(server: &Server) -> Client {
    let creds = Credentials {
        username: "csproot".to_string(),
        password: "csproot".to_string(),
        organization: "csp".to_string(),
    };
    Client::new(&server.url_str("/"), "v6", creds).expect("client must build")
}

fn body_eq(expected: serde_json::Value) -> impl Fn(&serde_json::Value) -> bool {
    move |body| *body == expected
}

#[tokio::test]
async fn authenticate_swaps_password_for_api_key() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/nuage/api/v6/me"),
            request::headers(contains(("authorization", "XREST Y3Nwcm9vdDpjc3Byb290"))),
            request::headers(contains(("x-nuage-organization", "csp"))),
        ])
        .respond_with(json_encoded(json!([{ "APIKey": "key-1" }]))),
    );
    // Follow-up requests must carry the key-based credential.
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/nuage/api/v6/enterprises"),
            request::headers(contains(("authorization", "XREST Y3Nwcm9vdDprZXktMQ=="))),
        ])
        .respond_with(json_encoded(json!([{ "ID": "ent-1", "name": "K8S-Enterprise" }]))),
    );

    let mut client = client(&server);
    client.authenticate().await.expect("authentication succeeds");
    let id = client
        .enterprise_id("K8S-Enterprise")
        .await
        .expect("lookup succeeds");
    assert_eq!(id, "ent-1");
}

#[tokio::test]
async fn create_zone_returns_new_id() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/nuage/api/v6/domains/dom-1/zones"))
            .respond_with(
                status_code(201).body(json!([{ "ID": "zone-1", "name": "alpha" }]).to_string()),
            ),
    );

    let id = client(&server)
        .create_zone("dom-1", "alpha")
        .await
        .expect("create succeeds");
    assert_eq!(id, "zone-1");
}

#[tokio::test]
async fn create_zone_conflict_resolves_by_name() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/nuage/api/v6/domains/dom-1/zones"))
            .respond_with(status_code(409).body("{}")),
    );
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/nuage/api/v6/domains/dom-1/zones"),
            request::headers(contains(("x-nuage-filter", "name == \"alpha\""))),
        ])
        .respond_with(json_encoded(json!([{ "ID": "zone-9", "name": "alpha" }]))),
    );

    let id = client(&server)
        .create_zone("dom-1", "alpha")
        .await
        .expect("conflict resolves to the existing zone");
    assert_eq!(id, "zone-9");
}

#[tokio::test]
async fn empty_lookup_is_not_found() {
    let server = Server::run();
    // The SDN answers an unmatched filter with either an empty list or a
    // list holding a single zero-valued element.
    server.expect(
        Expectation::matching(request::method_path("GET", "/nuage/api/v6/domains/dom-1/zones"))
            .times(2)
            .respond_with(cycle![
                json_encoded(json!([])),
                json_encoded(json!([{}])),
            ]),
    );

    let client = client(&server);
    for _ in 0..2 {
        match client.zone_id("dom-1", "alpha").await {
            Err(Error::NotFound { entity }) => assert_eq!(entity, "zone"),
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
    }
}

#[tokio::test]
async fn mismatched_lookup_is_rejected() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/nuage/api/v6/domains/dom-1/zones"))
            .respond_with(json_encoded(json!([{ "ID": "zone-2", "name": "beta" }]))),
    );

    match client(&server).zone_id("dom-1", "alpha").await {
        Err(Error::Mismatch {
            expected, found, ..
        }) => {
            assert_eq!(expected, "alpha");
            assert_eq!(found, "beta");
        }
        other => panic!("expected Mismatch, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn create_subnet_sends_address_and_netmask() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("POST", "/nuage/api/v6/zones/zone-1/subnets"),
            request::body(json_decoded(body_eq(json!({
                "name": "alpha-0",
                "IPType": "IPV4",
                "address": "10.128.0.0",
                "netmask": "255.255.255.0",
                "description": "Auto-generated subnet",
                "PATEnabled": "INHERITED",
            })))),
        ])
        .respond_with(status_code(201).body(json!([{ "ID": "sub-1" }]).to_string())),
    );

    let subnet = "10.128.0.0/24".parse().expect("subnet must parse");
    let id = client(&server)
        .create_subnet("alpha-0", "zone-1", &subnet)
        .await
        .expect("create succeeds");
    assert_eq!(id, "sub-1");
}

#[tokio::test]
async fn delete_treats_no_content_as_success() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path(
            "DELETE",
            "/nuage/api/v6/zones/zone-1",
        ))
        .respond_with(status_code(204)),
    );

    client(&server)
        .delete_zone("zone-1")
        .await
        .expect("delete succeeds");
}

#[tokio::test]
async fn delete_surfaces_unexpected_status() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path(
            "DELETE",
            "/nuage/api/v6/subnets/sub-1",
        ))
        .respond_with(status_code(412).body(
            json!({
                "internalErrorCode": 2039,
                "errors": [{
                    "property": "",
                    "descriptions": [{ "title": "Subnet in use", "description": "has active endpoints" }],
                }],
            })
            .to_string(),
        )),
    );

    match client(&server).delete_subnet("sub-1").await {
        Err(Error::UnexpectedStatus { status, message }) => {
            assert_eq!(status.as_u16(), 412);
            assert_eq!(message, "Subnet in use: has active endpoints");
        }
        other => panic!("expected UnexpectedStatus, got {:?}", other),
    }
}

#[tokio::test]
async fn group_membership_conflict_is_success() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path(
                "PUT",
                "/nuage/api/v6/networkmacrogroups/nmg-1/enterprisenetworks"
            ),
            request::body(json_decoded(body_eq(json!(["macro-1"])))),
        ])
        .times(2)
        .respond_with(cycle![status_code(204), status_code(409)]),
    );

    let client = client(&server);
    for _ in 0..2 {
        client
            .add_macro_to_group("nmg-1", "macro-1")
            .await
            .expect("membership is idempotent");
    }
}

#[tokio::test]
async fn acl_entry_conflict_resolves_by_semantic_fields() {
    let entry = AclEntry {
        action: "FORWARD".to_string(),
        ether_type: "0x800".to_string(),
        location_type: "ZONE".to_string(),
        location_id: "zone-1".to_string(),
        network_type: "NETWORK_MACRO_GROUP".to_string(),
        network_id: "nmg-1".to_string(),
        protocol: "ANY".to_string(),
        priority: 300,
        ..AclEntry::default()
    };

    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path(
            "POST",
            "/nuage/api/v6/ingressacltemplates/tpl-1/ingressaclentrytemplates",
        ))
        .respond_with(status_code(409).body("{}")),
    );
    // The lookup filter carries the semantic fields but not the priority, so
    // an entry from a previous run still matches.
    server.expect(
        Expectation::matching(all_of![
            request::method_path(
                "GET",
                "/nuage/api/v6/ingressacltemplates/tpl-1/ingressaclentrytemplates"
            ),
            request::headers(contains((
                "x-nuage-filter",
                "action == \"FORWARD\" and etherType == \"0x800\" and locationType == \"ZONE\" \
                 and networkType == \"NETWORK_MACRO_GROUP\" and protocol == \"ANY\" \
                 and locationID == \"zone-1\" and networkID == \"nmg-1\"",
            ))),
        ])
        .respond_with(json_encoded(json!([{
            "ID": "acl-7",
            "action": "FORWARD",
            "etherType": "0x800",
            "locationType": "ZONE",
            "locationID": "zone-1",
            "networkType": "NETWORK_MACRO_GROUP",
            "networkID": "nmg-1",
            "protocol": "ANY",
            "priority": 317,
        }]))),
    );

    let id = client(&server)
        .create_acl_entry("tpl-1", Direction::Ingress, &entry)
        .await
        .expect("conflict resolves to the existing entry");
    assert_eq!(id, "acl-7");
}

#[tokio::test]
async fn network_macro_conflict_resolves_by_tuple() {
    let macro_ = NetworkMacro {
        name: "NetworkMacro for service: alpha/web".to_string(),
        ip_type: "IPV4".to_string(),
        address: "172.30.1.5".to_string(),
        netmask: "255.255.255.255".to_string(),
        ..NetworkMacro::default()
    };

    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path(
            "POST",
            "/nuage/api/v6/enterprises/ent-1/enterprisenetworks",
        ))
        .respond_with(status_code(409).body("{}")),
    );
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/nuage/api/v6/enterprises/ent-1/networkmacros"),
            request::headers(contains((
                "x-nuage-filter",
                "name == \"NetworkMacro for service: alpha/web\" and IPType == \"IPV4\" \
                 and address == \"172.30.1.5\" and netmask == \"255.255.255.255\"",
            ))),
        ])
        .respond_with(json_encoded(json!([{
            "ID": "macro-3",
            "name": "NetworkMacro for service: alpha/web",
            "IPType": "IPV4",
            "address": "172.30.1.5",
            "netmask": "255.255.255.255",
        }]))),
    );

    let id = client(&server)
        .create_network_macro("ent-1", &macro_)
        .await
        .expect("conflict resolves to the existing macro");
    assert_eq!(id, "macro-3");
}

#[tokio::test]
async fn admin_user_password_is_digested() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("POST", "/nuage/api/v6/enterprises/ent-1/users"),
            request::body(json_decoded(body_eq(json!({
                "userName": "admin",
                "password": "d033e22ae348aeb5660fc2140aec35850c4da997",
                "firstName": "Admin",
                "lastName": "Admin",
                "email": "admin@localhost",
            })))),
        ])
        .respond_with(status_code(201).body(json!([{ "ID": "usr-1" }]).to_string())),
    );

    let id = client(&server)
        .create_admin_user("ent-1", "admin", "admin")
        .await
        .expect("create succeeds");
    assert_eq!(id, "usr-1");
}
