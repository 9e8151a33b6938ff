#![allow(dead_code)]

pub const GRAPH_URL: &str = "https://graph.test/beta";
pub const LOGIN_URL: &str = "https://login.test";
pub const TEST_TOKEN: &str = "test-token";

pub const TENANT_ID: &str = "tenant-1";
pub const CLIENT_ID: &str = "client-1";
pub const CLIENT_SECRET: &str = "secret-1";

pub const APPLICATIONS_PATH: &str = "deviceAppManagement/mobileApps";
pub const SCRIPTS_PATH: &str = "deviceManagement/deviceManagementScripts";
pub const REMEDIATIONS_PATH: &str = "deviceManagement/deviceHealthScripts";
