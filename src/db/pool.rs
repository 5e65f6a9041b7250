use postgres::{Client, NoTls};
use r2d2::ManageConnection;

pub struct PostgresConnectionManager {
    connection_string: String,
}

impl PostgresConnectionManager {
    pub fn new(connection_string: String) -> Self {
        Self { connection_string }
    }
}

impl ManageConnection for PostgresConnectionManager {
    type Connection = Client;
    type Error = postgres::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        Client::connect(&self.connection_string, NoTls)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.simple_query("SELECT 1").map(|_| ())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed()
    }
}
