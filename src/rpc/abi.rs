//! Contract interfaces of the curve factory, the per-token curve and the token itself.

use alloy_sol_types::sol;

sol! {
    #[allow(missing_docs)]
    interface ICurveFactory {
        event CurveDeployed(address indexed token, address indexed creator, address curve, address platform);

        function deployCurve(
            address token,
            address creator,
            address platform,
            uint256 initialSupply,
            uint256 virtualBaseReserve,
            uint256 virtualTokenReserve,
            uint256 curveSupplyCap,
            uint16 feeBps
        ) external returns (address curve);

        /// Zero address when no curve exists for the token.
        function getCurve(address token) external view returns (address curve);
    }

    #[allow(missing_docs)]
    interface IBondingCurve {
        /// `baseAmount` is the gross amount paid in, fee included.
        event Buy(address indexed token, address indexed buyer, uint256 baseAmount, uint256 tokenAmount, uint256 fee);
        /// `baseAmount` is the net amount paid out, fee excluded.
        event Sell(address indexed token, address indexed seller, uint256 baseAmount, uint256 tokenAmount, uint256 fee);
        event RewardPayout(address indexed token, address indexed recipient, uint256 amount);

        function buy(uint256 minTokensOut) external payable returns (uint256 tokensOut);
        function sell(uint256 tokenAmount, uint256 minBaseOut) external returns (uint256 baseOut);
        function getCurveState() external view returns (uint256 circulatingSupply, uint256 reserveBalance);
    }

    #[allow(missing_docs)]
    interface IContentToken {
        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}
